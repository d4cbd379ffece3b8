//! End-to-end integration tests for the WebPay protocol.
//!
//! Every test builds its own world: four trust roots (client, merchant,
//! payment, acquirer), a bank endpoint, an acquirer endpoint, a merchant
//! and a wallet, all wired through an in-memory
//! transport that serves Authority documents and routes POSTs straight into
//! the endpoints. Nothing touches a socket.
//!
//! The tests drive the public API only: the same calls a merchant backend,
//! a wallet and a provider node make in production.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use rust_decimal::Decimal;

use webpay_protocol::authority::{Authority, AuthorityResolver, EncryptionParameters};
use webpay_protocol::codec::{self, formats, EncryptedData, Envelope, Qualifier};
use webpay_protocol::config::JSON_CONTENT_TYPE;
use webpay_protocol::correlation::{ReferenceIdGenerator, TransactionContext};
use webpay_protocol::crypto::{DecryptionKey, RequestHash};
use webpay_protocol::merchant::{CompletedPayment, MerchantConfig, MerchantError, MerchantOrchestrator};
use webpay_protocol::messages::{
    error_response, AccountDescriptor, AccountType, AuthorizationData, ErrorCode, ErrorResponse,
    FinalizeRequest, FinalizeResponse, InvokeWallet, Message, Payee, PayerAuthorization,
    PaymentRequest, ReserveOrDebitRequest, ReserveOrDebitResponse,
};
use webpay_protocol::provider::{
    DuplicateFinalizePolicy, FinalizeConfig, FinalizeOrchestrator, Operation, ProviderConfig,
    ProviderEndpoint, ReplyStatus, ReserveOrDebitOrchestrator,
};
use webpay_protocol::transport::{HttpResponse, Transport};
use webpay_protocol::trust::{CertificateAuthority, Signer};
use webpay_protocol::wallet::{Wallet, WalletAccount};
use webpay_protocol::{Outcome, PaymentError};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

const PROVIDER_AUTHORITY: &str = "https://mybank.com/webpay/authority";
const PROVIDER_TRANSACT: &str = "https://mybank.com/webpay/transact";
const ACQUIRER_AUTHORITY: &str = "https://secure.cardpay.com/webpay/authority";
const ACQUIRER_TRANSACT: &str = "https://secure.cardpay.com/webpay/transact";

const BANK_ACCOUNT_ID: &str = "FR7630004003200001019471656";
const CARD_NUMBER: &str = "6875056745552109";
const CLIENT_IP: &str = "220.13.198.144";

/// Serves Authority documents on GET and routes POSTs to mounted endpoints.
/// Every POST is logged so tests can count round trips.
#[derive(Default)]
struct Network {
    documents: RwLock<HashMap<String, Vec<u8>>>,
    endpoints: RwLock<HashMap<String, ProviderEndpoint>>,
    posts: RwLock<Vec<String>>,
}

impl Network {
    fn publish(&self, authority: &Envelope<Authority>) {
        self.documents.write().insert(
            authority.payload.authority_url.clone(),
            authority.to_canonical_bytes().unwrap(),
        );
    }

    fn mount(&self, url: &str, endpoint: ProviderEndpoint) {
        self.endpoints.write().insert(url.to_string(), endpoint);
    }

    fn document(&self, url: &str) -> Vec<u8> {
        self.documents.read().get(url).cloned().unwrap()
    }

    fn posts(&self) -> Vec<String> {
        self.posts.read().clone()
    }
}

#[async_trait]
impl Transport for Network {
    async fn get(&self, url: &str) -> Result<HttpResponse, PaymentError> {
        let body = self.documents.read().get(url).cloned();
        Ok(match body {
            Some(body) => HttpResponse::json(body),
            None => HttpResponse {
                status: 404,
                content_type: None,
                body: Vec::new(),
            },
        })
    }

    async fn post(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, PaymentError> {
        let endpoint = self.endpoints.read().get(url).cloned();
        let endpoint =
            endpoint.ok_or_else(|| PaymentError::Transport(format!("cannot connect to {url}")))?;
        self.posts.write().push(url.to_string());
        let reply = endpoint.handle(Some(JSON_CONTENT_TYPE), &body).await;
        Ok(HttpResponse::json(reply.body))
    }
}

#[derive(Default)]
struct Options {
    duplicate_policy: DuplicateFinalizePolicy,
    /// Bank signs its responses with a key from a look-alike root.
    rogue_provider: bool,
}

struct World {
    network: Arc<Network>,
    payment_root: CertificateAuthority,
    merchant_root: CertificateAuthority,
    merchant_signer: Signer,
    payer_signer: Signer,
    merchant: MerchantOrchestrator,
    wallet: Wallet,
    resolver: AuthorityResolver,
    provider: ProviderEndpoint,
    acquirer: ProviderEndpoint,
}

fn world() -> World {
    world_with(Options::default())
}

fn world_with(options: Options) -> World {
    let client_root = CertificateAuthority::new("Client Root");
    let merchant_root = CertificateAuthority::new("Merchant Root");
    let payment_root = CertificateAuthority::new("Payment Root");
    let acquirer_root = CertificateAuthority::new("Acquirer Root");

    let network = Arc::new(Network::default());
    let transport: Arc<dyn Transport> = network.clone();
    let reference_ids = Arc::new(ReferenceIdGenerator::default());

    // Bank
    let bank_signer = payment_root.issue_signer("mybank.com").unwrap();
    let bank_key = DecryptionKey::generate();
    network.publish(
        &Authority::signed(
            PROVIDER_AUTHORITY,
            PROVIDER_TRANSACT,
            EncryptionParameters::new(bank_key.public_key()),
            &bank_signer,
        )
        .unwrap(),
    );
    let response_signer = if options.rogue_provider {
        CertificateAuthority::new("Payment Root")
            .issue_signer("mybank.com")
            .unwrap()
    } else {
        bank_signer.clone()
    };
    let provider = ProviderEndpoint::provider(
        ReserveOrDebitOrchestrator::new(
            Arc::new(ProviderConfig {
                signer: response_signer,
                decryption_keys: vec![bank_key],
                client_root: client_root.anchor(),
                merchant_root: merchant_root.anchor(),
                acquirer_root: acquirer_root.anchor(),
            }),
            AuthorityResolver::new(Arc::clone(&transport)),
            Arc::clone(&reference_ids),
        ),
        FinalizeOrchestrator::new(
            Arc::new(FinalizeConfig {
                signer: bank_signer.clone(),
                expected_issuer: bank_signer.certificate_path().clone(),
                merchant_root: merchant_root.anchor(),
                decryption_keys: Vec::new(),
                duplicate_policy: options.duplicate_policy,
            }),
            Arc::clone(&reference_ids),
        ),
    );
    network.mount(PROVIDER_TRANSACT, provider.clone());

    // Acquirer
    let acquirer_signer = acquirer_root.issue_signer("cardpay.com").unwrap();
    let acquirer_key = DecryptionKey::generate();
    network.publish(
        &Authority::signed(
            ACQUIRER_AUTHORITY,
            ACQUIRER_TRANSACT,
            EncryptionParameters::new(acquirer_key.public_key()),
            &acquirer_signer,
        )
        .unwrap(),
    );
    let acquirer = ProviderEndpoint::acquirer(FinalizeOrchestrator::new(
        Arc::new(FinalizeConfig {
            signer: acquirer_signer,
            expected_issuer: bank_signer.certificate_path().clone(),
            merchant_root: merchant_root.anchor(),
            decryption_keys: vec![acquirer_key],
            duplicate_policy: options.duplicate_policy,
        }),
        Arc::clone(&reference_ids),
    ));
    network.mount(ACQUIRER_TRANSACT, acquirer.clone());

    // Merchant
    let merchant_signer = merchant_root.issue_signer("demomerchant.com").unwrap();
    let merchant = MerchantOrchestrator::new(
        Arc::new(MerchantConfig {
            signer: merchant_signer.clone(),
            payee: Payee {
                common_name: "Demo Merchant".into(),
                id: "#1000".into(),
            },
            payment_root: payment_root.anchor(),
            acquirer_root: acquirer_root.anchor(),
            acquirer_authority_url: ACQUIRER_AUTHORITY.into(),
            payee_accounts: vec![
                AccountDescriptor::new("http://ultragiro.fr", "35964640"),
                AccountDescriptor::new("http://mybank.com", "J-399.962")
                    .with_field("class", "enterprise"),
            ],
        }),
        Arc::clone(&transport),
        Arc::new(ReferenceIdGenerator::new(1_000)),
    );

    // Wallet
    let payer_signer = client_root.issue_signer("payer@mybank.com").unwrap();
    let wallet = Wallet::new(payer_signer.clone(), merchant_root.anchor());

    World {
        network,
        payment_root,
        merchant_root,
        merchant_signer,
        payer_signer,
        merchant,
        wallet,
        resolver: AuthorityResolver::new(transport),
        provider,
        acquirer,
    }
}

impl World {
    /// First turnaround: the merchant invokes the wallet.
    fn invoke(&self, amount: &str, reserve_mode: bool) -> (Envelope<InvokeWallet>, TransactionContext) {
        self.merchant
            .create_payment_request(
                Decimal::from_str(amount).unwrap(),
                "EUR",
                vec![AccountType::BankAccount, AccountType::SuperCard],
                reserve_mode,
                true,
            )
            .unwrap()
    }

    /// The wallet resolves the provider and answers with an encrypted
    /// authorization.
    async fn authorize(&self, invoke: &Envelope<InvokeWallet>, account: &WalletAccount) -> Vec<u8> {
        let provider = self
            .resolver
            .resolve(&account.provider_authority_url, &self.payment_root.anchor())
            .await
            .unwrap();
        self.wallet
            .authorize(invoke, account, &provider, "demomerchant.com", None)
            .unwrap()
            .to_canonical_bytes()
            .unwrap()
    }

    /// A full payment: invoke, authorize, process.
    async fn pay(
        &self,
        amount: &str,
        account: &WalletAccount,
        reserve_mode: bool,
    ) -> Result<Outcome<CompletedPayment>, MerchantError> {
        let (invoke, context) = self.invoke(amount, reserve_mode);
        let authorization = self.authorize(&invoke, account).await;
        self.merchant
            .process(context, &authorization, Some(CLIENT_IP.into()))
            .await
    }

    /// A merchant-signed payment request with arbitrary validity. The
    /// merchant orchestrator only ever issues fresh ones.
    fn payment_request(&self, issued: chrono::Duration, lifetime: chrono::Duration) -> PaymentRequest {
        let date_time = formats::now() - issued;
        let mut request = PaymentRequest {
            payee: Payee {
                common_name: "Demo Merchant".into(),
                id: "#1000".into(),
            },
            amount: Decimal::from_str("250.00").unwrap(),
            currency: "EUR".into(),
            reference_id: "#9001".into(),
            date_time,
            expires: date_time + lifetime,
            signature: None,
        };
        self.merchant_signer.sign(&mut request).unwrap();
        request
    }

    /// Payer-signed authorization of `payment_request`, encrypted for the
    /// bank. Skips the wallet's own expiry check.
    async fn encrypted_authorization(&self, payment_request: &PaymentRequest) -> EncryptedData {
        let bank = self
            .resolver
            .resolve(PROVIDER_AUTHORITY, &self.payment_root.anchor())
            .await
            .unwrap();
        let mut authorization = AuthorizationData {
            payment_request: payment_request.clone(),
            account_type: AccountType::BankAccount,
            account_id: BANK_ACCOUNT_ID.into(),
            domain_name: "demomerchant.com".into(),
            date_time: formats::now(),
            client_ip_address: None,
            signature: None,
        };
        self.payer_signer.sign(&mut authorization).unwrap();
        let parameters = &bank.encryption_parameters;
        EncryptedData::encrypt(
            &authorization,
            &parameters.public_key,
            &parameters.key_encryption_algorithm,
            &parameters.data_encryption_algorithm,
        )
        .unwrap()
    }

    /// The merchant's attestation of a bank account authorization, signed
    /// and serialized.
    fn attest(
        &self,
        authorization_data: EncryptedData,
        payment_request: &PaymentRequest,
        expires: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Vec<u8> {
        let qualifier = if expires.is_some() {
            Qualifier::ReserveFundsRequest
        } else {
            Qualifier::DirectDebitRequest
        };
        let mut request = Envelope::new(
            qualifier,
            ReserveOrDebitRequest {
                authorization_data,
                account_type: AccountType::BankAccount,
                request_hash: payment_request.request_hash().unwrap(),
                reference_id: payment_request.reference_id.clone(),
                acquirer_authority_url: None,
                payee_accounts: Some(vec![AccountDescriptor::new("http://ultragiro.fr", "35964640")]),
                client_ip_address: None,
                expires,
                date_time: formats::now(),
                signature: None,
            },
        );
        self.merchant_signer.sign(&mut request).unwrap();
        request.to_canonical_bytes().unwrap()
    }

    async fn completed(&self, amount: &str, account: &WalletAccount, reserve_mode: bool) -> CompletedPayment {
        self.pay(amount, account, reserve_mode)
            .await
            .unwrap()
            .success()
            .expect("payment should be approved")
    }
}

fn bank_account() -> WalletAccount {
    WalletAccount {
        account_type: AccountType::BankAccount,
        account_id: BANK_ACCOUNT_ID.into(),
        provider_authority_url: PROVIDER_AUTHORITY.into(),
    }
}

fn card() -> WalletAccount {
    WalletAccount {
        account_type: AccountType::SuperCard,
        account_id: CARD_NUMBER.into(),
        provider_authority_url: PROVIDER_AUTHORITY.into(),
    }
}

/// Request bytes of the `index`-th captured exchange.
fn captured_request(payment: &CompletedPayment, index: usize) -> Vec<u8> {
    payment.trace.as_ref().unwrap().exchanges[index]
        .request
        .clone()
        .into_bytes()
}

fn captured_response(payment: &CompletedPayment, index: usize) -> Vec<u8> {
    payment.trace.as_ref().unwrap().exchanges[index]
        .response
        .clone()
        .into_bytes()
}

// ---------------------------------------------------------------------------
// 1. Bank Account, Reserve Then Finalize
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bank_account_reserve_and_finalize() {
    let world = world();
    let payment = world.completed("250.00", &bank_account(), true).await;

    assert!(!payment.direct_debit);
    assert!(!payment.acquirer_mode);
    assert_eq!(payment.account_type, AccountType::BankAccount);
    assert_eq!(payment.account_reference, BANK_ACCOUNT_ID);
    assert_eq!(payment.payment_request.amount.to_string(), "250.00");
    assert!(payment.finalize_reference_id.is_some());
    assert_eq!(world.network.posts(), vec![PROVIDER_TRANSACT, PROVIDER_TRANSACT]);

    let trace = payment.trace.as_ref().unwrap();
    assert_eq!(trace.exchanges.len(), 2);
    assert_eq!(
        codec::peek_qualifier(trace.exchanges[0].request.as_bytes()).unwrap(),
        Qualifier::ReserveFundsRequest
    );
    assert_eq!(
        codec::peek_qualifier(trace.exchanges[1].response.as_bytes()).unwrap(),
        Qualifier::PayeeFinalizeResponse
    );
}

// ---------------------------------------------------------------------------
// 2. Bank Account, Direct Debit
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bank_account_direct_debit() {
    let world = world();
    let payment = world.completed("250.00", &bank_account(), false).await;

    assert!(payment.direct_debit);
    assert!(payment.finalize_reference_id.is_none());
    assert_eq!(world.network.posts(), vec![PROVIDER_TRANSACT]);

    let response: Envelope<ReserveOrDebitResponse> =
        codec::decode(&captured_response(&payment, 0), &[Qualifier::DirectDebitResponse]).unwrap();
    let approval = response.payload.approval.unwrap();
    // Debits do not expire; the first payee account is used.
    assert!(approval.expires.is_none());
    assert_eq!(approval.payee_account.unwrap().id, "35964640");
}

// ---------------------------------------------------------------------------
// 3. Card Payment Through the Acquirer
// ---------------------------------------------------------------------------

#[tokio::test]
async fn card_payment_finalizes_at_the_acquirer() {
    let world = world();
    // Reserve mode is irrelevant for cards: they are always two-phase.
    let payment = world.completed("250.00", &card(), false).await;

    assert!(payment.acquirer_mode);
    assert!(!payment.direct_debit);
    assert_eq!(payment.account_reference, "************2109");
    assert!(payment.finalize_reference_id.is_some());
    assert_eq!(world.network.posts(), vec![PROVIDER_TRANSACT, ACQUIRER_TRANSACT]);

    let reserve_request = String::from_utf8(captured_request(&payment, 0)).unwrap();
    let reserve_response = String::from_utf8(captured_response(&payment, 0)).unwrap();
    assert!(!reserve_request.contains(CARD_NUMBER));
    assert!(!reserve_response.contains(CARD_NUMBER));
    assert!(reserve_response.contains("\"encryptedAccountData\""));
    assert!(reserve_request.contains(ACQUIRER_AUTHORITY));
}

// ---------------------------------------------------------------------------
// 4. Insufficient Funds
// ---------------------------------------------------------------------------

#[tokio::test]
async fn one_million_is_declined() {
    let world = world();
    let outcome = world.pay("1000000.00", &bank_account(), true).await.unwrap();
    let declined = outcome.declined().expect("should be declined").clone();
    assert_eq!(declined.code, ErrorCode::InsufficientFunds);
    // No finalize after a decline.
    assert_eq!(world.network.posts(), vec![PROVIDER_TRANSACT]);
}

#[tokio::test]
async fn just_below_the_ceiling_is_approved() {
    let world = world();
    let payment = world.completed("999999.99", &bank_account(), true).await;
    assert_eq!(payment.payment_request.amount.to_string(), "999999.99");
}

// ---------------------------------------------------------------------------
// 5. Trust Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rogue_provider_signature_is_a_trust_error() {
    let world = world_with(Options {
        rogue_provider: true,
        ..Options::default()
    });
    let err = world.pay("250.00", &bank_account(), true).await.unwrap_err();
    assert_eq!(err.url.as_deref(), Some(PROVIDER_TRANSACT));
    assert!(matches!(err.error, PaymentError::Trust(_)), "{err}");
    assert!(err.to_string().starts_with(&format!("URL={PROVIDER_TRANSACT}\n")));
}

#[tokio::test]
async fn finalize_from_foreign_issuer_is_a_trust_error() {
    let world = world();
    let payment = world.completed("250.00", &bank_account(), true).await;
    let bytes = captured_request(&payment, 1);
    let request: Envelope<FinalizeRequest> =
        codec::decode(&bytes, &[Qualifier::PayeeFinalizeRequest]).unwrap();

    // An acquirer that only accepts reservations from another bank.
    let other_bank = world.payment_root.issue_signer("otherbank.com").unwrap();
    let strict = FinalizeOrchestrator::new(
        Arc::new(FinalizeConfig {
            signer: other_bank.clone(),
            expected_issuer: other_bank.certificate_path().clone(),
            merchant_root: world.merchant_root.anchor(),
            decryption_keys: Vec::new(),
            duplicate_policy: DuplicateFinalizePolicy::Replay,
        }),
        Arc::new(ReferenceIdGenerator::default()),
    );
    let err = strict
        .process(&request, RequestHash::of(&bytes))
        .unwrap_err();
    assert!(matches!(err, PaymentError::Trust(_)), "{err}");
}

#[tokio::test]
async fn authority_served_from_the_wrong_url_is_rejected() {
    let world = world();
    let mirror = "https://mirror.mybank.com/webpay/authority";
    let bytes = world.network.document(PROVIDER_AUTHORITY);
    world.network.documents.write().insert(mirror.into(), bytes);

    let err = world
        .resolver
        .resolve(mirror, &world.payment_root.anchor())
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::Protocol(_)));
}

#[tokio::test]
async fn unknown_provider_fails_at_its_url() {
    let world = world();
    let (invoke, context) = world.invoke("250.00", true);
    let authorization = world.authorize(&invoke, &bank_account()).await;

    // The routing hint is outside the ciphertext; point it somewhere dead.
    let mut payer: Envelope<PayerAuthorization> =
        codec::decode(&authorization, &[Qualifier::PayerAuthorization]).unwrap();
    let nowhere = "https://nowhere.example/authority";
    payer.payload.provider_authority_url = nowhere.into();

    let err = world
        .merchant
        .process(context, &payer.to_canonical_bytes().unwrap(), None)
        .await
        .unwrap_err();
    assert_eq!(err.url.as_deref(), Some(nowhere));
    assert!(matches!(err.error, PaymentError::Transport(_)));
    assert!(world.network.posts().is_empty());
}

// ---------------------------------------------------------------------------
// 6. Request Hash Binding
// ---------------------------------------------------------------------------

#[tokio::test]
async fn authorization_for_another_request_is_refused() {
    let world = world();
    let (invoke_a, _context_a) = world.invoke("250.00", true);
    let (_invoke_b, context_b) = world.invoke("25.00", true);

    // The payer authorized A; the merchant attests it as B.
    let authorization = world.authorize(&invoke_a, &bank_account()).await;
    let err = world
        .merchant
        .process(context_b, &authorization, None)
        .await
        .unwrap_err();
    assert_eq!(err.url.as_deref(), Some(PROVIDER_TRANSACT));
    assert!(err.to_string().contains("integrity error"), "{err}");
}

#[tokio::test]
async fn bit_flips_in_a_direct_debit_request_never_pass() {
    let world = world();
    let payment = world.completed("250.00", &bank_account(), false).await;
    let original = captured_request(&payment, 0);

    // The untouched request gets the first debit's response back.
    let reply = world.provider.handle(Some(JSON_CONTENT_TYPE), &original).await;
    assert_eq!(reply.status, ReplyStatus::Approved);
    assert_eq!(reply.body, captured_response(&payment, 0));

    for index in (0..original.len()).step_by(31) {
        for mask in [0x01u8, 0x20] {
            let mut tampered = original.clone();
            tampered[index] ^= mask;
            let reply = world.provider.handle(Some(JSON_CONTENT_TYPE), &tampered).await;
            assert_eq!(
                reply.status,
                ReplyStatus::Failed,
                "flip {mask:#04x} at byte {index} was accepted"
            );
            assert_eq!(
                codec::peek_qualifier(&reply.body).unwrap(),
                Qualifier::ErrorResponse
            );
        }
    }
}

// ---------------------------------------------------------------------------
// 7. Every Message Kind Survives Decode and Encode
// ---------------------------------------------------------------------------

#[tokio::test]
async fn every_qualifier_roundtrips_through_message() {
    let world = world();
    let mut documents: Vec<Vec<u8>> = Vec::new();

    documents.push(world.wallet.initialized().to_canonical_bytes().unwrap());
    let (invoke, _) = world.invoke("42.00", true);
    documents.push(invoke.to_canonical_bytes().unwrap());
    documents.push(world.authorize(&invoke, &bank_account()).await);
    documents.push(world.network.document(PROVIDER_AUTHORITY));
    documents.push(error_response("Internal error").to_canonical_bytes().unwrap());

    for reserve_mode in [false, true] {
        let payment = world.completed("42.00", &bank_account(), reserve_mode).await;
        for exchange in &payment.trace.unwrap().exchanges {
            documents.push(exchange.request.clone().into_bytes());
            documents.push(exchange.response.clone().into_bytes());
        }
    }

    let mut seen = HashSet::new();
    for bytes in &documents {
        let message = Message::decode(bytes).unwrap();
        seen.insert(message.qualifier());
        assert_eq!(
            &message.encode().unwrap(),
            bytes,
            "{} did not re-encode byte for byte",
            message.qualifier()
        );
    }
    assert_eq!(seen.len(), Qualifier::ALL.len());
}

// ---------------------------------------------------------------------------
// 8. Concurrent Payments
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_payments_get_distinct_references() {
    let world = Arc::new(world());
    let handles: Vec<_> = (0..16)
        .map(|i| {
            let world = Arc::clone(&world);
            tokio::spawn(async move {
                let account = if i % 2 == 0 { bank_account() } else { card() };
                world.completed("10.00", &account, i % 3 == 0).await
            })
        })
        .collect();

    let mut merchant_refs = HashSet::new();
    let mut provider_refs = HashSet::new();
    for handle in handles {
        let payment = handle.await.unwrap();
        assert!(merchant_refs.insert(payment.payment_request.reference_id.clone()));
        assert!(provider_refs.insert(payment.reference_id.clone()));
        if let Some(finalized) = payment.finalize_reference_id {
            assert!(provider_refs.insert(finalized));
        }
    }
    assert_eq!(merchant_refs.len(), 16);
}

// ---------------------------------------------------------------------------
// 9. Duplicate Finalize
// ---------------------------------------------------------------------------

#[tokio::test]
async fn identical_finalize_retry_is_replayed() {
    let world = world();
    let payment = world.completed("250.00", &bank_account(), true).await;
    let request = captured_request(&payment, 1);
    let first_response = captured_response(&payment, 1);

    let retry = world.provider.handle(Some(JSON_CONTENT_TYPE), &request).await;
    assert_eq!(retry.operation, Operation::Finalize);
    assert_eq!(retry.status, ReplyStatus::Approved);
    assert_eq!(retry.body, first_response);
}

#[tokio::test]
async fn different_finalize_for_same_reservation_is_declined() {
    let world = world();
    let payment = world.completed("250.00", &bank_account(), true).await;
    let mut request: Envelope<FinalizeRequest> =
        codec::decode(&captured_request(&payment, 1), &[Qualifier::PayeeFinalizeRequest]).unwrap();
    request.payload.amount = Decimal::from_str("100.00").unwrap();
    world.merchant_signer.sign(&mut request).unwrap();

    let reply = world
        .provider
        .handle(Some(JSON_CONTENT_TYPE), &request.to_canonical_bytes().unwrap())
        .await;
    assert_eq!(reply.status, ReplyStatus::Declined);
    let response: Envelope<FinalizeResponse> =
        codec::decode(&reply.body, &[Qualifier::PayeeFinalizeResponse]).unwrap();
    assert_eq!(
        response.payload.error_return.unwrap().code,
        ErrorCode::AlreadyFinalized
    );
}

#[tokio::test]
async fn reprocess_policy_confirms_every_retry() {
    let world = world_with(Options {
        duplicate_policy: DuplicateFinalizePolicy::Reprocess,
        ..Options::default()
    });
    let payment = world.completed("250.00", &bank_account(), true).await;
    let request = captured_request(&payment, 1);

    let retry = world.provider.handle(Some(JSON_CONTENT_TYPE), &request).await;
    assert_eq!(retry.status, ReplyStatus::Approved);
    assert_ne!(retry.body, captured_response(&payment, 1));
}

#[tokio::test]
async fn capture_above_the_reserved_amount_fails() {
    let world = world_with(Options {
        duplicate_policy: DuplicateFinalizePolicy::Reprocess,
        ..Options::default()
    });
    let payment = world.completed("250.00", &bank_account(), true).await;
    let mut request: Envelope<FinalizeRequest> =
        codec::decode(&captured_request(&payment, 1), &[Qualifier::PayeeFinalizeRequest]).unwrap();
    request.payload.amount = Decimal::from_str("250.01").unwrap();
    world.merchant_signer.sign(&mut request).unwrap();

    let reply = world
        .provider
        .handle(Some(JSON_CONTENT_TYPE), &request.to_canonical_bytes().unwrap())
        .await;
    assert_eq!(reply.status, ReplyStatus::Failed);
}

// ---------------------------------------------------------------------------
// 10. Endpoint Dispatch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn acquirer_refuses_reserve_requests() {
    let world = world();
    let payment = world.completed("250.00", &bank_account(), true).await;
    let reply = world
        .acquirer
        .handle(Some(JSON_CONTENT_TYPE), &captured_request(&payment, 0))
        .await;
    assert_eq!(reply.status, ReplyStatus::Failed);
    assert_eq!(reply.operation, Operation::Unrouted);
    assert_eq!(reply.qualifier, Qualifier::ErrorResponse);
}

#[tokio::test]
async fn wrong_content_type_is_refused() {
    let world = world();
    let payment = world.completed("250.00", &bank_account(), false).await;
    let reply = world
        .provider
        .handle(Some("text/plain"), &captured_request(&payment, 0))
        .await;
    assert_eq!(reply.status, ReplyStatus::Failed);
    let error: Envelope<ErrorResponse> =
        codec::decode(&reply.body, &[Qualifier::ErrorResponse]).unwrap();
    assert!(error.payload.description.contains("Content-Type"));
}

#[tokio::test]
async fn garbage_gets_an_error_response() {
    let world = world();
    let reply = world.provider.handle(Some(JSON_CONTENT_TYPE), b"{\"not\":").await;
    assert_eq!(reply.status, ReplyStatus::Failed);
    assert!(Message::decode(&reply.body).is_ok());
}

// ---------------------------------------------------------------------------
// 11. Expiry and Replay at the Provider
// ---------------------------------------------------------------------------

fn decline_code(body: &[u8], qualifier: Qualifier) -> ErrorCode {
    let response: Envelope<ReserveOrDebitResponse> = codec::decode(body, &[qualifier]).unwrap();
    response.payload.error_return.expect("declined").code
}

#[tokio::test]
async fn expired_payment_request_is_declined() {
    let world = world();
    let payment_request = world.payment_request(
        chrono::Duration::minutes(40),
        chrono::Duration::minutes(30),
    );
    let authorization = world.encrypted_authorization(&payment_request).await;
    let request = world.attest(authorization, &payment_request, None);

    let reply = world.provider.handle(Some(JSON_CONTENT_TYPE), &request).await;
    assert_eq!(reply.operation, Operation::ReserveOrDebit);
    assert_eq!(reply.status, ReplyStatus::Declined);
    assert_eq!(
        decline_code(&reply.body, Qualifier::DirectDebitResponse),
        ErrorCode::ExpiredAuthorization
    );
}

#[tokio::test]
async fn reserve_with_past_expiry_is_declined() {
    let world = world();
    let payment_request = world.payment_request(
        chrono::Duration::zero(),
        chrono::Duration::minutes(30),
    );
    let authorization = world.encrypted_authorization(&payment_request).await;
    let request = world.attest(
        authorization,
        &payment_request,
        Some(formats::now() - chrono::Duration::seconds(1)),
    );

    let reply = world.provider.handle(Some(JSON_CONTENT_TYPE), &request).await;
    assert_eq!(reply.status, ReplyStatus::Declined);
    assert_eq!(
        decline_code(&reply.body, Qualifier::ReserveFundsResponse),
        ErrorCode::ExpiredReservation
    );
}

#[tokio::test]
async fn resent_reservation_gets_the_same_approval() {
    let world = world();
    let payment = world.completed("250.00", &bank_account(), true).await;

    let reply = world
        .provider
        .handle(Some(JSON_CONTENT_TYPE), &captured_request(&payment, 0))
        .await;
    assert_eq!(reply.status, ReplyStatus::Approved);
    assert_eq!(reply.body, captured_response(&payment, 0));
}

#[tokio::test]
async fn reattested_debit_for_a_used_authorization_is_declined() {
    let world = world();
    let payment = world.completed("250.00", &bank_account(), false).await;
    let mut request: Envelope<ReserveOrDebitRequest> =
        codec::decode(&captured_request(&payment, 0), &[Qualifier::DirectDebitRequest]).unwrap();
    request.payload.date_time = formats::now() + chrono::Duration::seconds(1);
    world.merchant_signer.sign(&mut request).unwrap();

    let reply = world
        .provider
        .handle(Some(JSON_CONTENT_TYPE), &request.to_canonical_bytes().unwrap())
        .await;
    assert_eq!(reply.status, ReplyStatus::Declined);
    assert_eq!(
        decline_code(&reply.body, Qualifier::DirectDebitResponse),
        ErrorCode::AlreadyProcessed
    );
}

#[tokio::test]
async fn fresh_hand_built_debit_is_approved_once() {
    let world = world();
    let payment_request = world.payment_request(
        chrono::Duration::zero(),
        chrono::Duration::minutes(30),
    );
    let first = world.attest(
        world.encrypted_authorization(&payment_request).await,
        &payment_request,
        None,
    );
    let reply = world.provider.handle(Some(JSON_CONTENT_TYPE), &first).await;
    assert_eq!(reply.status, ReplyStatus::Approved);

    // A second authorization of the same payment request is a second debit.
    let second = world.attest(
        world.encrypted_authorization(&payment_request).await,
        &payment_request,
        None,
    );
    let reply = world.provider.handle(Some(JSON_CONTENT_TYPE), &second).await;
    assert_eq!(
        decline_code(&reply.body, Qualifier::DirectDebitResponse),
        ErrorCode::AlreadyProcessed
    );
}
