use etl_core::{
    ConfigError, CoreError, ErrorExt, ErrorReporter, RedditApiError, WriteError, EXIT_AUTH,
    EXIT_CONFIG, EXIT_REQUEST, EXIT_TRANSIENT, EXIT_WRITE,
};
use std::time::Duration;

fn transient() -> CoreError {
    CoreError::TransientFailure {
        operation: "fetch_top_posts".to_string(),
        attempts: 3,
        last_error: "Server error: 503".to_string(),
    }
}

#[test]
fn test_error_codes() {
    let config_error = CoreError::Config(ConfigError::MissingField {
        field: "subreddit".to_string(),
    });
    assert_eq!(config_error.error_code(), "CONFIG");

    let auth_error = CoreError::Auth {
        reason: "invalid_client".to_string(),
    };
    assert_eq!(auth_error.error_code(), "AUTH");

    let request_error = CoreError::Request {
        message: "forbidden".to_string(),
        status_code: Some(403),
    };
    assert_eq!(request_error.error_code(), "REQUEST");

    assert_eq!(transient().error_code(), "TRANSIENT_FAILURE");

    let write_error = CoreError::Write(WriteError::TransactionFailed {
        reason: "disk full".to_string(),
    });
    assert_eq!(write_error.error_code(), "WRITE");
}

#[test]
fn test_exit_codes_are_distinct_and_non_zero() {
    let errors = vec![
        CoreError::Config(ConfigError::MissingEnvironmentVariable {
            var_name: "REDDIT_CLIENT_ID".to_string(),
        }),
        CoreError::Auth {
            reason: "bad".to_string(),
        },
        CoreError::Request {
            message: "gone".to_string(),
            status_code: Some(404),
        },
        transient(),
        CoreError::Write(WriteError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "boom",
        ))),
    ];

    let codes: Vec<u8> = errors.iter().map(|e| e.exit_code()).collect();
    assert_eq!(
        codes,
        vec![EXIT_CONFIG, EXIT_AUTH, EXIT_REQUEST, EXIT_TRANSIENT, EXIT_WRITE]
    );
    assert!(codes.iter().all(|code| *code != 0));
}

#[test]
fn test_retryable_errors() {
    assert!(transient().is_retryable());
    assert_eq!(transient().retry_after(), Some(Duration::from_secs(300)));

    let non_retryable_error = CoreError::Config(ConfigError::MissingField {
        field: "client_id".to_string(),
    });
    assert!(!non_retryable_error.is_retryable());
    assert_eq!(non_retryable_error.retry_after(), None);
}

#[test]
fn test_non_retried_api_errors_map_onto_taxonomy() {
    let auth: CoreError = RedditApiError::InvalidToken.into();
    assert!(matches!(auth, CoreError::Auth { .. }));

    let not_found: CoreError = RedditApiError::SubredditNotFound {
        subreddit: "nope".to_string(),
    }
    .into();
    match not_found {
        CoreError::Request { status_code, .. } => assert_eq!(status_code, Some(404)),
        other => panic!("expected request error, got {:?}", other),
    }

    let bad_request: CoreError = RedditApiError::ClientError {
        status_code: 422,
        message: "bad time filter".to_string(),
    }
    .into();
    assert!(bad_request.to_string().contains("422"));
}

#[test]
fn test_user_friendly_messages() {
    let config_error = CoreError::Config(ConfigError::MissingEnvironmentVariable {
        var_name: "REDDIT_CLIENT_SECRET".to_string(),
    });
    let message = config_error.user_friendly_message();
    assert!(message.contains("REDDIT_CLIENT_SECRET"));

    let message = transient().user_friendly_message();
    assert!(message.contains("3 attempts"));
}

#[test]
fn test_error_reporter() {
    let reporter = ErrorReporter::new();
    let error = CoreError::Auth {
        reason: "invalid_client".to_string(),
    };

    reporter.report_error(&error);

    let summary = reporter.summary(&error);
    assert!(summary.starts_with("[AUTH]"));
}
