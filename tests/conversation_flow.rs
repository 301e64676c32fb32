//! Integration tests for the conversational turn flow.
//!
//! These tests drive `ConversationStateMachine` through its public API:
//! 1. Admission through an in-memory token bucket on a manual clock
//! 2. Sessions kept on a fault-injecting in-memory backend
//! 3. Mock extraction and compliance collaborators behind real breakers

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use proposalos_core::adapters::ai::MockFactExtractor;
use proposalos_core::adapters::compliance::MockComplianceChecker;
use proposalos_core::adapters::rate_limiter::InMemoryRateLimiter;
use proposalos_core::adapters::resilience::{CircuitBreakerRegistry, Dependency};
use proposalos_core::adapters::session_store::{
    FaultInjectingBackend, InMemorySessionBackend, SessionStore, SessionStoreOptions,
};
use proposalos_core::adapters::ManualClock;
use proposalos_core::application::conversation::header_names;
use proposalos_core::application::{
    ConversationSettings, ConversationStateMachine, NextAction, TurnError, TurnOutcome,
    TurnRequest,
};
use proposalos_core::domain::admission::BucketPolicy;
use proposalos_core::domain::conversation::UserInput;
use proposalos_core::domain::foundation::{ClientId, ErrorCode, SessionId};
use proposalos_core::domain::session::{ComplianceStatus, DataState};
use proposalos_core::ports::{
    CircuitBreakerConfig, CircuitState, ComplianceError, ExtractedField, ExtractionError,
    SessionBackend,
};

// =============================================================================
// Test Infrastructure
// =============================================================================

type Backend = FaultInjectingBackend<InMemorySessionBackend>;

struct Harness {
    machine: ConversationStateMachine,
    extractor: MockFactExtractor,
    compliance: MockComplianceChecker,
    registry: Arc<CircuitBreakerRegistry>,
    store: Arc<SessionStore>,
    backend: Arc<Backend>,
    clock: Arc<ManualClock>,
}

struct Setup {
    policy: BucketPolicy,
    compliance_threshold: u32,
    extractor: MockFactExtractor,
    compliance: MockComplianceChecker,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            policy: BucketPolicy::per_minute(100, 100).unwrap(),
            compliance_threshold: 3,
            extractor: MockFactExtractor::new(),
            compliance: MockComplianceChecker::new(),
        }
    }
}

impl Setup {
    fn build(self) -> Harness {
        let clock = Arc::new(ManualClock::default());

        let mut presets: HashMap<String, CircuitBreakerConfig> = Dependency::ALL
            .iter()
            .map(|d| (d.name().to_string(), d.default_config()))
            .collect();
        presets.insert(
            Dependency::Compliance.name().to_string(),
            CircuitBreakerConfig::new(self.compliance_threshold, Duration::from_secs(60)),
        );
        let registry = Arc::new(CircuitBreakerRegistry::with_configs(
            clock.clone(),
            presets,
            CircuitBreakerConfig::default(),
        ));

        let backend = Arc::new(FaultInjectingBackend::new(
            "memory",
            InMemorySessionBackend::new(),
        ));
        let store = Arc::new(SessionStore::new(
            vec![backend.clone() as Arc<dyn SessionBackend>],
            SessionStoreOptions::default(),
            clock.clone(),
        ));

        let limiter = Arc::new(InMemoryRateLimiter::new(
            self.policy,
            Duration::from_secs(600),
            clock.clone(),
        ));

        let machine = ConversationStateMachine::new(
            limiter,
            store.clone(),
            registry.clone(),
            Arc::new(self.extractor.clone()),
            Arc::new(self.compliance.clone()),
            clock.clone(),
            ConversationSettings::default(),
        );

        Harness {
            machine,
            extractor: self.extractor,
            compliance: self.compliance,
            registry,
            store,
            backend,
            clock,
        }
    }
}

fn client() -> ClientId {
    ClientId::new("acme-estimator").unwrap()
}

fn all_required_fields(confidence: f64) -> Vec<ExtractedField> {
    vec![
        ExtractedField::new("traveler_name", "Dana Reyes", confidence),
        ExtractedField::new("origin_city", "Denver", confidence),
        ExtractedField::new("destination_city", "Washington", confidence),
        ExtractedField::new("departure_date", "2026-03-02", confidence),
        ExtractedField::new("return_date", "2026-03-05", confidence),
        ExtractedField::new("transportation_mode", "air", confidence),
        ExtractedField::new("trip_purpose", "Program management review", confidence),
    ]
}

impl Harness {
    async fn start(&self, input: UserInput) -> TurnOutcome {
        self.machine
            .handle_turn(TurnRequest::new(None, client(), input))
            .await
            .unwrap()
    }

    async fn turn(&self, id: SessionId, input: UserInput) -> Result<TurnOutcome, TurnError> {
        self.machine
            .handle_turn(TurnRequest::new(Some(id), client(), input))
            .await
    }
}

// =============================================================================
// Happy path
// =============================================================================

#[tokio::test]
async fn single_message_completes_session_and_export_is_idempotent() {
    let h = Setup {
        extractor: MockFactExtractor::new().with_fields(all_required_fields(0.95)),
        ..Default::default()
    }
    .build();

    let first = h
        .start(UserInput::message(
            "Dana Reyes flies Denver to Washington March 2-5 for the program review",
        ))
        .await;

    assert_eq!(first.action, NextAction::ReviewAndExport);
    assert_eq!(first.snapshot.data_state, DataState::Complete);
    assert_eq!(first.snapshot.completion_percentage, 100);
    assert_eq!(first.snapshot.compliance, ComplianceStatus::Passed);
    assert!(first.snapshot.missing_required_fields.is_empty());
    assert!(first.question.is_none());
    assert!(first.degraded.is_none());
    assert_eq!(h.compliance.call_count(), 1);

    let exported = h.turn(first.session_id, UserInput::Export).await.unwrap();
    assert_eq!(exported.action, NextAction::Exported);
    assert_eq!(exported.snapshot.data_state, DataState::Exported);
    let export = exported.export.expect("export snapshot");
    assert_eq!(export.fields["origin_city"], "Denver");
    assert_eq!(export.fields.len(), 7);

    h.clock.advance(Duration::from_secs(30));
    let again = h.machine.export(&first.session_id, &client()).await.unwrap();
    assert_eq!(again, export);
}

#[tokio::test]
async fn low_confidence_value_is_confirmed_by_reply() {
    let h = Setup {
        extractor: MockFactExtractor::new()
            .with_fields(vec![ExtractedField::new("origin_city", "Denver", 0.5)]),
        ..Default::default()
    }
    .build();

    let first = h.start(UserInput::message("probably leaving from Denver")).await;
    assert_eq!(
        first.action,
        NextAction::ConfirmField {
            field: "origin_city".into()
        }
    );
    assert_eq!(first.snapshot.data_state, DataState::AwaitingConfirmation);
    assert!(!first.snapshot.collected_fields.contains_key("origin_city"));

    let second = h.turn(first.session_id, UserInput::message("Yes")).await.unwrap();

    assert_eq!(second.snapshot.data_state, DataState::Collecting);
    let origin = &second.snapshot.collected_fields["origin_city"];
    assert_eq!(origin.value, "Denver");
    assert!(origin.confirmed_by_user);
    assert_eq!(
        second.action,
        NextAction::AskForField {
            field: "traveler_name".into()
        }
    );
    // The reply settled the question without another extraction.
    assert_eq!(h.extractor.call_count(), 1);
}

// =============================================================================
// Merge policy
// =============================================================================

#[tokio::test]
async fn confirmed_value_survives_conflicting_extraction() {
    let h = Setup::default().build();
    let first = h
        .start(UserInput::statement("origin_city", "Denver"))
        .await;
    assert_eq!(first.snapshot.collected_fields["origin_city"].value, "Denver");

    h.extractor
        .push_fields(vec![ExtractedField::new("origin_city", "Houston", 0.9)]);
    let second = h
        .turn(first.session_id, UserInput::message("We might stop over in Houston"))
        .await
        .unwrap();

    assert_eq!(second.snapshot.collected_fields["origin_city"].value, "Denver");
    assert!(second.snapshot.pending_confirmations.is_empty());

    let stored = h.store.get(&first.session_id).await.unwrap();
    let rejected = stored.rejected_extractions();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].field, "origin_city");
    assert_eq!(rejected[0].kept, "Denver");
    assert_eq!(rejected[0].proposed, "Houston");
}

// =============================================================================
// Degraded dependencies
// =============================================================================

#[tokio::test]
async fn failing_extractor_degrades_to_direct_questions_and_recovers() {
    let extractor = MockFactExtractor::new();
    for _ in 0..5 {
        extractor.push_error(ExtractionError::Unavailable("503".into()));
    }
    let h = Setup {
        extractor,
        ..Default::default()
    }
    .build();

    let first = h.start(UserInput::message("hello")).await;
    let id = first.session_id;
    assert!(first.degraded.as_deref().unwrap().contains("extraction failed"));
    assert_eq!(
        first.action,
        NextAction::AskForField {
            field: "traveler_name".into()
        }
    );

    for _ in 0..4 {
        let outcome = h.turn(id, UserInput::message("still here")).await.unwrap();
        assert!(outcome.degraded.is_some());
    }
    let breaker = h.registry.dependency(Dependency::ModelEndpoint);
    assert_eq!(breaker.state(), CircuitState::Open);

    let rejected = h.turn(id, UserInput::message("anyone?")).await.unwrap();
    assert!(rejected.degraded.as_deref().unwrap().contains("circuit open"));
    assert_eq!(h.extractor.call_count(), 5);
    assert_eq!(
        rejected.action,
        NextAction::AskForField {
            field: "traveler_name".into()
        }
    );

    // After the recovery timeout a probe goes through and closes the breaker.
    h.clock.advance(Duration::from_secs(61));
    let recovered = h.turn(id, UserInput::message("back again")).await.unwrap();
    assert!(recovered.degraded.is_none());
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(h.extractor.call_count(), 6);
}

#[tokio::test]
async fn compliance_is_skipped_while_its_breaker_is_open() {
    let h = Setup {
        compliance_threshold: 1,
        extractor: MockFactExtractor::new().with_fields(all_required_fields(0.9)),
        compliance: MockComplianceChecker::new()
            .with_error(ComplianceError::Unavailable("maintenance".into())),
        ..Default::default()
    }
    .build();

    let first = h.start(UserInput::message("full trip details")).await;
    assert_eq!(first.snapshot.data_state, DataState::Complete);
    assert!(matches!(
        &first.snapshot.compliance,
        ComplianceStatus::Skipped { reason } if reason.contains("maintenance")
    ));
    assert_eq!(
        h.registry.dependency(Dependency::Compliance).state(),
        CircuitState::Open
    );

    let second = h
        .turn(first.session_id, UserInput::statement("hotel_nights", "3"))
        .await
        .unwrap();

    assert_eq!(second.action, NextAction::ReviewAndExport);
    assert!(matches!(
        &second.snapshot.compliance,
        ComplianceStatus::Skipped { reason } if reason.contains("circuit open")
    ));
    assert_eq!(h.compliance.call_count(), 1);

    // An unchecked session can still be exported.
    let export = h.machine.export(&first.session_id, &client()).await.unwrap();
    assert!(matches!(export.compliance, ComplianceStatus::Skipped { .. }));
}

#[tokio::test]
async fn storage_outage_mid_turn_asks_to_retry() {
    let h = Setup {
        extractor: MockFactExtractor::new().with_delay(Duration::from_millis(200)),
        ..Default::default()
    }
    .build();
    let first = h.start(UserInput::statement("origin_city", "Denver")).await;
    let id = first.session_id;

    let (outcome, _) = tokio::join!(h.turn(id, UserInput::message("hello")), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.backend.set_unavailable(true);
    });
    let outcome = outcome.unwrap();

    assert_eq!(outcome.action, NextAction::RetryLater);
    assert_eq!(outcome.snapshot.data_state, DataState::Error);
    assert!(outcome.degraded.is_some());

    h.backend.set_unavailable(false);
    let retried = h.turn(id, UserInput::message("hello")).await.unwrap();
    assert_eq!(
        retried.action,
        NextAction::AskForField {
            field: "traveler_name".into()
        }
    );
    assert_eq!(retried.snapshot.data_state, DataState::Collecting);
}

// =============================================================================
// Admission
// =============================================================================

#[tokio::test]
async fn burst_beyond_capacity_is_rate_limited_with_headers() {
    let h = Setup {
        policy: BucketPolicy::per_minute(2, 1).unwrap(),
        ..Default::default()
    }
    .build();

    let first = h.start(UserInput::statement("origin_city", "Denver")).await;
    assert_eq!(
        first.headers.get(&header_names::X_RATELIMIT_LIMIT).unwrap(),
        "2"
    );
    let id = first.session_id;
    h.turn(id, UserInput::statement("destination_city", "Boston"))
        .await
        .unwrap();

    let err = h
        .turn(id, UserInput::statement("trip_purpose", "Site visit"))
        .await
        .unwrap_err();

    match &err {
        TurnError::RateLimited {
            retry_after,
            headers,
        } => {
            assert!(*retry_after > Duration::ZERO);
            assert!(headers.contains_key(&header_names::RETRY_AFTER));
            assert_eq!(headers.get(&header_names::X_RATELIMIT_REMAINING).unwrap(), "0");
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }
    assert_eq!(err.code(), ErrorCode::RateLimited);

    h.clock.advance(Duration::from_secs(61));
    let admitted = h
        .turn(id, UserInput::statement("trip_purpose", "Site visit"))
        .await
        .unwrap();
    assert_eq!(admitted.snapshot.collected_fields["trip_purpose"].value, "Site visit");
}

// =============================================================================
// Session errors
// =============================================================================

#[tokio::test]
async fn session_of_another_client_is_not_found() {
    let h = Setup::default().build();
    let first = h.start(UserInput::statement("origin_city", "Denver")).await;

    let err = h
        .machine
        .handle_turn(TurnRequest::new(
            Some(first.session_id),
            ClientId::new("someone-else").unwrap(),
            UserInput::message("hi"),
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, TurnError::SessionNotFound(id) if id == first.session_id));
}

#[tokio::test]
async fn export_before_completion_lists_missing_fields() {
    let h = Setup::default().build();
    let first = h.start(UserInput::statement("origin_city", "Denver")).await;

    let err = h.turn(first.session_id, UserInput::Export).await.unwrap_err();

    match err {
        TurnError::ExportNotReady { missing } => {
            assert_eq!(missing.len(), 6);
            assert_eq!(missing[0], "traveler_name");
            assert!(!missing.contains(&"origin_city".to_string()));
        }
        other => panic!("expected ExportNotReady, got {other:?}"),
    }
}

#[tokio::test]
async fn idle_session_expires() {
    let h = Setup::default().build();
    let first = h.start(UserInput::statement("origin_city", "Denver")).await;

    h.clock.advance(Duration::from_secs(3601));
    let err = h
        .turn(first.session_id, UserInput::message("still there?"))
        .await
        .unwrap_err();

    assert!(matches!(err, TurnError::SessionExpired(_)));
    assert_eq!(err.code(), ErrorCode::SessionExpired);
}

#[tokio::test]
async fn unknown_field_statement_is_invalid_input() {
    let h = Setup::default().build();
    let first = h.start(UserInput::statement("origin_city", "Denver")).await;

    let err = h
        .turn(first.session_id, UserInput::statement("favourite_colour", "blue"))
        .await
        .unwrap_err();

    assert!(matches!(err, TurnError::InvalidInput(_)));
}
