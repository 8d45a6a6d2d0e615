//! Integration tests for protected notification delivery through a
//! fully wired `ResilienceSystem`

mod common;

use common::{init_test_logging, RecordingTransport};
use upstream_guard::config::GuardConfig;
use upstream_guard::notify::{Channel, TransportError};
use upstream_guard::resilience::components;
use upstream_guard::{CircuitState, DeliveryOutcome, Notification, ResilienceSystem};

async fn system() -> ResilienceSystem {
    ResilienceSystem::from_config(&GuardConfig::default())
        .await
        .expect("default configuration is valid")
}

fn order_confirmation() -> Notification {
    Notification::email(
        "buyer@example.com",
        "Order #1042 confirmed",
        "Thanks for your order.",
    )
    .with_metadata("order_id", "1042")
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried_until_delivered() {
    init_test_logging();
    let system = system().await;
    let transport = RecordingTransport::new(Channel::Email);
    transport.fail_next(TransportError::Transient("503 from relay".into()), 2);
    let notifier = system.notifier(transport.clone());

    let notification = order_confirmation();
    let outcome = notifier.notify(&notification).await;

    match outcome {
        DeliveryOutcome::Delivered { attempts, receipt } => {
            assert_eq!(attempts, 3);
            assert_eq!(receipt.notification_id, notification.id);
            assert_eq!(receipt.provider_message_id.as_deref(), Some("email-3"));
        }
        other => panic!("expected Delivered, got {other:?}"),
    }

    // Every attempt carried the same idempotency id
    let delivered = transport.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].id, notification.id);
    assert_eq!(transport.attempts(), 3);
    assert_eq!(notifier.circuit_breaker().state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_permanent_failure_is_not_retried() {
    let system = system().await;
    let transport = RecordingTransport::scripted(
        Channel::WhatsApp,
        vec![TransportError::Permanent("recipient not on WhatsApp".into())],
    );
    let notifier = system.notifier(transport.clone());

    let outcome = notifier
        .notify(&Notification::whatsapp("+15550100", "Your order shipped"))
        .await;

    match outcome {
        DeliveryOutcome::Failed { attempts, error } => {
            assert_eq!(attempts, 1);
            assert!(error.contains("recipient not on WhatsApp"));
        }
        other => panic!("expected Failed, got {other:?}"),
    }
    assert_eq!(transport.attempts(), 1);
    assert_eq!(notifier.circuit_breaker().name(), components::WHATSAPP_SERVICE);
}

#[tokio::test(start_paused = true)]
async fn test_email_outage_opens_circuit_then_skips() {
    let system = system().await;
    let transport = RecordingTransport::new(Channel::Email);
    transport.fail_next(TransportError::Transient("connection reset".into()), 10);
    let notifier = system.notifier(transport.clone());

    // Three failed attempts reach the email breaker's threshold
    let first = notifier.notify(&order_confirmation()).await;
    assert!(matches!(first, DeliveryOutcome::Failed { attempts: 3, .. }));
    assert_eq!(notifier.circuit_breaker().state(), CircuitState::Open);

    let second = notifier.notify(&order_confirmation()).await;
    assert_eq!(second, DeliveryOutcome::Skipped { retry_after_secs: 120 });
    assert_eq!(transport.attempts(), 3);

    let health = system.health().await;
    assert!(!health.is_healthy());
    assert_eq!(
        health.circuit_breakers.unhealthy_circuits(),
        vec![components::EMAIL_SERVICE]
    );
}

#[tokio::test]
async fn test_forced_open_circuit_skips_transport() {
    let system = system().await;
    let transport = RecordingTransport::new(Channel::Email);
    let notifier = system.notifier(transport.clone());

    system
        .force_state(components::EMAIL_SERVICE, CircuitState::Open)
        .unwrap();
    let outcome = notifier.notify(&order_confirmation()).await;
    assert!(matches!(outcome, DeliveryOutcome::Skipped { .. }));
    assert_eq!(transport.attempts(), 0);

    system.reset_all();
    let outcome = notifier.notify(&order_confirmation()).await;
    assert!(outcome.is_delivered());
    assert_eq!(transport.attempts(), 1);
}

#[tokio::test]
async fn test_channels_use_separate_breakers() {
    let system = system().await;
    let email = system.notifier(RecordingTransport::new(Channel::Email));
    let whatsapp = system.notifier(RecordingTransport::new(Channel::WhatsApp));

    system
        .force_state(components::EMAIL_SERVICE, CircuitState::Open)
        .unwrap();

    assert!(!email.notify(&order_confirmation()).await.is_delivered());
    assert!(whatsapp
        .notify(&Notification::whatsapp("+15550100", "Your order shipped"))
        .await
        .is_delivered());
}
