use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::json;

use caseflow_client::transport::TransportError;
use caseflow_client::{Client, ClientConfig};

/// Exit codes: 0=success, 1=client error (validation, not found),
///             2=server or storage error, 3=connection error, 4=usage error
pub const EXIT_OK: i32 = 0;
pub const EXIT_CLIENT: i32 = 1;
pub const EXIT_SERVER: i32 = 2;
pub const EXIT_CONNECTION: i32 = 3;
pub const EXIT_USAGE: i32 = 4;

fn to_pretty<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("{{\"error\":\"cli_error\",\"message\":\"{e}\"}}"))
}

pub fn exit_error(message: &str, docs_hint: Option<&str>) -> ! {
    std::process::exit(print_error("cli_error", message, docs_hint, EXIT_USAGE));
}

/// Print a structured error to stderr and return `code`.
pub fn print_error(kind: &str, message: &str, docs_hint: Option<&str>, code: i32) -> i32 {
    let mut err = json!({
        "error": kind,
        "message": message
    });
    if let Some(hint) = docs_hint {
        err["docs_hint"] = json!(hint);
    }
    eprintln!("{}", to_pretty(&err));
    code
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> i32 {
    println!("{}", to_pretty(value));
    EXIT_OK
}

/// One compact JSON document per line, for streaming output.
pub fn print_json_line<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{line}"),
        Err(e) => eprintln!("{{\"error\":\"cli_error\",\"message\":\"{e}\"}}"),
    }
}

pub fn transport_exit_code(error: &TransportError) -> i32 {
    match error {
        TransportError::Unreachable(_) => EXIT_CONNECTION,
        TransportError::Rejected { status, .. } if (400..500).contains(status) => EXIT_CLIENT,
        TransportError::Rejected { .. } | TransportError::Decode(_) => EXIT_SERVER,
    }
}

pub fn print_transport_error(error: &TransportError) -> i32 {
    let code = transport_exit_code(error);
    let hint =
        (code == EXIT_CONNECTION).then_some("Is the API server running? Check CASEFLOW_API_URL.");
    let kind = if code == EXIT_CONNECTION {
        "connection_error"
    } else {
        "api_error"
    };
    print_error(kind, &error.to_string(), hint, code)
}

pub fn print_storage_error(error: &dyn std::error::Error) -> i32 {
    print_error(
        "storage_error",
        &error.to_string(),
        Some("Check that CASEFLOW_DATA_DIR is writable."),
        EXIT_SERVER,
    )
}

pub fn open_client(config: ClientConfig) -> Client {
    match Client::open(config) {
        Ok(client) => client,
        Err(e) => {
            print_storage_error(&e);
            std::process::exit(EXIT_SERVER);
        }
    }
}

/// RFC3339 timestamp, or a bare `YYYY-MM-DD` date meaning midnight UTC.
pub fn parse_datetime(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("'{raw}' is neither RFC3339 nor YYYY-MM-DD"))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn parse_datetime_accepts_rfc3339_and_dates() {
        assert_eq!(
            parse_datetime("2026-06-01T10:30:00+02:00"),
            Ok(Utc.with_ymd_and_hms(2026, 6, 1, 8, 30, 0).unwrap())
        );
        assert_eq!(
            parse_datetime(" 2026-06-01 "),
            Ok(Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap())
        );
        assert!(parse_datetime("next tuesday").is_err());
    }

    #[test]
    fn transport_errors_map_to_exit_codes() {
        let rejected = |status| TransportError::Rejected {
            status,
            code: "x".to_string(),
            message: String::new(),
        };
        assert_eq!(transport_exit_code(&rejected(400)), EXIT_CLIENT);
        assert_eq!(transport_exit_code(&rejected(404)), EXIT_CLIENT);
        assert_eq!(transport_exit_code(&rejected(502)), EXIT_SERVER);
        assert_eq!(
            transport_exit_code(&TransportError::Unreachable("refused".into())),
            EXIT_CONNECTION
        );
    }
}
