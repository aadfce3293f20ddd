//! Response decoding, kept free of I/O so every status/body combination can be tested
//! without a server.

use calcsheet_lock::{parse_conflict_owner, LockError};
use calcsheet_model::{Lock, SheetDefinition, SheetId, VersionId, VersionSnapshot, VersionSummary};
use calcsheet_versions::SourceError;
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Body of a `409 Conflict` from the lock endpoint.
#[derive(Debug, Default, Deserialize)]
struct ConflictBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    owner: Option<String>,
}

fn is_empty_body(body: &[u8]) -> bool {
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    trimmed.is_empty() || trimmed == "null"
}

fn parse<T: DeserializeOwned>(body: &[u8]) -> Result<T, String> {
    serde_json::from_slice(body).map_err(|err| err.to_string())
}

/// The lock holder named by a conflict response: the structured `owner` field if
/// present, otherwise whatever follows "Locked by" in the message.
pub fn conflict_owner(body: &[u8]) -> String {
    let parsed: ConflictBody = parse(body).unwrap_or_else(|_| ConflictBody {
        message: String::from_utf8_lossy(body).into_owned(),
        owner: None,
    });
    parsed
        .owner
        .filter(|owner| !owner.trim().is_empty())
        .or_else(|| parse_conflict_owner(&parsed.message))
        .unwrap_or_else(|| "unknown".to_string())
}

/// `GET /sheets/{id}/lock`
pub fn decode_peek(status: u16, body: &[u8]) -> Result<Option<Lock>, LockError> {
    match status {
        204 | 404 => Ok(None),
        200 if is_empty_body(body) => Ok(None),
        200 => parse(body).map(Some).map_err(LockError::Network),
        _ => Err(LockError::Unexpected { status }),
    }
}

/// `POST /sheets/{id}/lock` and `POST /sheets/{id}/lock/takeover`
pub fn decode_lock(status: u16, body: &[u8]) -> Result<Lock, LockError> {
    match status {
        200 | 201 => parse(body).map_err(LockError::Network),
        409 => Err(LockError::Conflict {
            owner: conflict_owner(body),
        }),
        _ => Err(LockError::Unexpected { status }),
    }
}

/// `DELETE /sheets/{id}/lock`. A lock that is already gone counts as released.
pub fn decode_release(status: u16) -> Result<(), LockError> {
    match status {
        200..=299 | 404 => Ok(()),
        _ => Err(LockError::Unexpected { status }),
    }
}

fn decode_source<T: DeserializeOwned>(
    status: u16,
    body: &[u8],
    not_found: impl FnOnce() -> SourceError,
) -> Result<T, SourceError> {
    match status {
        200 | 201 => parse(body).map_err(SourceError::Decode),
        404 => Err(not_found()),
        _ => Err(SourceError::Unexpected { status }),
    }
}

/// `GET /sheets/{id}`
pub fn decode_sheet(sheet: &SheetId, status: u16, body: &[u8]) -> Result<SheetDefinition, SourceError> {
    decode_source(status, body, || SourceError::SheetNotFound(sheet.clone()))
}

/// `GET /sheets/{id}/versions/{versionId}`
pub fn decode_version(
    sheet: &SheetId,
    version: &VersionId,
    status: u16,
    body: &[u8],
) -> Result<VersionSnapshot, SourceError> {
    decode_source(status, body, || SourceError::VersionNotFound {
        sheet: sheet.clone(),
        version: version.clone(),
    })
}

/// `GET /sheets/{id}/versions`
pub fn decode_versions(
    sheet: &SheetId,
    status: u16,
    body: &[u8],
) -> Result<Vec<VersionSummary>, SourceError> {
    decode_source(status, body, || SourceError::SheetNotFound(sheet.clone()))
}

/// `POST /sheets/{id}/versions`
pub fn decode_created(sheet: &SheetId, status: u16, body: &[u8]) -> Result<VersionSnapshot, SourceError> {
    decode_source(status, body, || SourceError::SheetNotFound(sheet.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const LOCK: &str = r#"{
        "sheetId": "s1",
        "userId": "alice",
        "tabId": "t1",
        "acquiredAt": "2024-05-01T12:00:00Z",
        "expiresAt": "2024-05-01T12:00:30Z"
    }"#;

    #[test]
    fn peek_distinguishes_free_and_held() {
        assert_eq!(decode_peek(204, b""), Ok(None));
        assert_eq!(decode_peek(200, b" null "), Ok(None));
        let lock = decode_peek(200, LOCK.as_bytes()).unwrap().unwrap();
        assert_eq!(lock.user_id, "alice");
        assert_eq!(decode_peek(500, b""), Err(LockError::Unexpected { status: 500 }));
    }

    #[test]
    fn conflict_prefers_structured_owner() {
        assert_eq!(
            decode_lock(409, br#"{"message":"Locked by alice","owner":"alice@example.com"}"#),
            Err(LockError::Conflict {
                owner: "alice@example.com".into()
            })
        );
        assert_eq!(
            decode_lock(409, br#"{"message":"Locked by bob"}"#),
            Err(LockError::Conflict {
                owner: "bob".into()
            })
        );
        assert_eq!(
            decode_lock(409, b"Locked by carol"),
            Err(LockError::Conflict {
                owner: "carol".into()
            })
        );
        assert_eq!(conflict_owner(b"{}"), "unknown");
    }

    #[test]
    fn malformed_lock_body_is_an_error() {
        assert!(matches!(decode_lock(200, b"{"), Err(LockError::Network(_))));
    }

    #[test]
    fn release_treats_missing_lock_as_done() {
        assert_eq!(decode_release(200), Ok(()));
        assert_eq!(decode_release(404), Ok(()));
        assert_eq!(decode_release(403), Err(LockError::Unexpected { status: 403 }));
    }

    #[test]
    fn version_list_ignores_node_payloads() {
        let body = br#"[{
            "id": "v1",
            "sheetId": "s1",
            "tag": "release",
            "createdAt": "2024-05-01T12:00:00Z",
            "nodes": [],
            "isDefault": true
        }]"#;
        let list = decode_versions(&SheetId::new("s1"), 200, body).unwrap();
        assert_eq!(list.len(), 1);
        assert!(list[0].is_default);
    }

    #[test]
    fn missing_version_maps_to_not_found() {
        let err = decode_version(&SheetId::new("s1"), &VersionId::new("v9"), 404, b"").unwrap_err();
        assert_eq!(
            err,
            SourceError::VersionNotFound {
                sheet: SheetId::new("s1"),
                version: VersionId::new("v9")
            }
        );
        assert!(matches!(
            decode_sheet(&SheetId::new("s1"), 200, b"[]"),
            Err(SourceError::Decode(_))
        ));
    }
}
