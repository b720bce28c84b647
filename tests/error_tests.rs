// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use activity_sync::error::SyncError;

fn rate_limited() -> SyncError {
    SyncError::RateLimited {
        window: "short".to_string(),
        retry_after: activity_sync::time_utils::from_unix(1_700_000_900),
    }
}

#[test]
fn test_error_classification() {
    assert!(!rate_limited().is_auth_expired());
    assert!(!rate_limited().is_item_level());

    let auth = SyncError::AuthExpired("revoked".to_string());
    assert!(auth.is_auth_expired());
    assert!(!auth.is_item_level());

    assert!(SyncError::Network("reset".to_string()).is_item_level());
    assert!(SyncError::Provider {
        status: 500,
        message: "boom".to_string()
    }
    .is_item_level());
    assert!(SyncError::DetailFetch {
        activity_id: 1,
        message: "gone".to_string()
    }
    .is_item_level());

    assert!(!SyncError::Store("down".to_string()).is_item_level());
    assert!(!SyncError::InvariantViolation("bad".to_string()).is_item_level());
}

#[test]
fn test_user_messages() {
    assert_eq!(rate_limited().user_message(), SyncError::RESUME_MESSAGE);
    assert_eq!(
        SyncError::AuthExpired("x".to_string()).user_message(),
        SyncError::RECONNECT_MESSAGE
    );
    assert_eq!(
        SyncError::Store("x".to_string()).user_message(),
        SyncError::FAILURE_MESSAGE
    );
    assert_eq!(
        SyncError::Internal(anyhow::anyhow!("x")).user_message(),
        SyncError::FAILURE_MESSAGE
    );
}

#[test]
fn test_display_includes_window() {
    let msg = rate_limited().to_string();
    assert!(msg.contains("short"));
    assert!(msg.contains("2023-11-14"));
}
