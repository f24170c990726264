//! HEPiX image list format
//!
//! A HEPiX list is a JSON document rooted at `hv:imagelist`, usually
//! distributed inside a clear-signed S/MIME envelope. Every entry of
//! `hv:images` wraps an `hv:image` object which must carry the full set
//! of fields declared on [`HepixImage`]; a single incomplete entry
//! invalidates the whole list.
//!
//! The envelope signature is not checked. Trust is established by
//! comparing the list endorser against the DN pinned in the source
//! definition.

use crate::checksum;
use crate::error::{ImgsyncError, ImgsyncResult};
use crate::image::{Image, ImageMetadata};
use crate::image_list::is_plain_name;
use crate::image_list::source::{FetchedList, ListFormat, SourceDefinition};
use crate::transport::Transport;
use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::HashSet;
use std::io::Read;
use tracing::{debug, warn};

/// HEPiX list format
pub struct HepixFormat;

impl ListFormat for HepixFormat {
    fn fetch(
        &self,
        name: &str,
        definition: &SourceDefinition,
        transport: &dyn Transport,
    ) -> ImgsyncResult<FetchedList> {
        let mut body = transport.open(&definition.url, definition.token.as_deref())?;

        let mut payload = String::new();
        body.read_to_string(&mut payload)
            .map_err(|e| ImgsyncError::Transport {
                uri: definition.url.clone(),
                status: None,
                reason: e.to_string(),
            })?;

        let fetched = parse(&payload, definition, Utc::now())?;
        debug!(
            "List '{}' has {} image(s) (trusted: {}, verified: {}, expired: {})",
            name,
            fetched.images.len(),
            fetched.trusted,
            fetched.verified,
            fetched.expired
        );
        Ok(fetched)
    }
}

#[derive(Deserialize)]
struct HepixDocument {
    #[serde(rename = "hv:imagelist")]
    imagelist: HepixList,
}

#[derive(Deserialize)]
struct HepixList {
    #[serde(rename = "dc:identifier", default)]
    identifier: Option<String>,
    #[serde(rename = "dc:title", default)]
    title: Option<String>,
    #[serde(rename = "dc:date:expires", default)]
    expires: Option<String>,
    #[serde(rename = "hv:endorser", default)]
    endorser: Option<HepixEndorser>,
    #[serde(rename = "hv:images", default)]
    images: Vec<HepixImageEntry>,
}

#[derive(Deserialize)]
struct HepixEndorser {
    #[serde(rename = "hv:x509")]
    x509: HepixX509,
}

#[derive(Deserialize)]
struct HepixX509 {
    #[serde(rename = "hv:dn", default)]
    dn: Option<String>,
}

#[derive(Deserialize)]
struct HepixImageEntry {
    #[serde(rename = "hv:image")]
    image: HepixImage,
}

/// Required fields of a HEPiX image entry
#[derive(Deserialize)]
struct HepixImage {
    #[serde(rename = "ad:group", deserialize_with = "scalar")]
    group: String,
    #[serde(rename = "ad:mpuri", deserialize_with = "scalar")]
    mpuri: String,
    #[serde(rename = "ad:user:fullname", deserialize_with = "scalar")]
    user_fullname: String,
    #[serde(rename = "ad:user:guid", deserialize_with = "scalar")]
    user_guid: String,
    #[serde(rename = "ad:user:uri", deserialize_with = "scalar")]
    user_uri: String,
    #[serde(rename = "dc:description", deserialize_with = "scalar")]
    description: String,
    #[serde(rename = "dc:identifier", deserialize_with = "scalar")]
    identifier: String,
    #[serde(rename = "dc:title", deserialize_with = "scalar")]
    title: String,
    #[serde(rename = "hv:hypervisor", deserialize_with = "scalar")]
    hypervisor: String,
    #[serde(rename = "hv:format", deserialize_with = "scalar")]
    format: String,
    #[serde(rename = "hv:size", deserialize_with = "scalar")]
    size: String,
    #[serde(rename = "hv:uri", deserialize_with = "scalar")]
    uri: String,
    #[serde(rename = "hv:version", deserialize_with = "scalar")]
    version: String,
    #[serde(rename = "sl:arch", deserialize_with = "scalar")]
    arch: String,
    #[serde(rename = "sl:checksum:sha512", deserialize_with = "scalar")]
    sha512: String,
    #[serde(rename = "sl:comments", deserialize_with = "scalar")]
    comments: String,
    #[serde(rename = "sl:os", deserialize_with = "scalar")]
    os: String,
    #[serde(rename = "sl:osname", deserialize_with = "scalar")]
    osname: String,
    #[serde(rename = "sl:osversion", deserialize_with = "scalar")]
    osversion: String,
}

/// Accept any non-null JSON scalar as text
fn scalar<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Err(D::Error::custom("field is null")),
        other => Ok(other.to_string()),
    }
}

impl TryFrom<HepixImage> for Image {
    type Error = ImgsyncError;

    fn try_from(raw: HepixImage) -> ImgsyncResult<Self> {
        if !is_plain_name(&raw.identifier) {
            return Err(ImgsyncError::invalid_list(format!(
                "image identifier '{}' is not a valid file name",
                raw.identifier
            )));
        }

        let size = raw.size.trim().parse::<u64>().map_err(|_| {
            ImgsyncError::invalid_list(format!(
                "image '{}' has invalid size '{}'",
                raw.identifier, raw.size
            ))
        })?;

        Ok(Image::new(ImageMetadata {
            identifier: raw.identifier,
            title: raw.title,
            description: raw.description,
            uri: raw.uri,
            sha512: raw.sha512.trim().to_ascii_lowercase(),
            format: raw.format,
            size,
            arch: raw.arch,
            os: raw.os,
            osname: raw.osname,
            osversion: raw.osversion,
            hypervisor: raw.hypervisor,
            version: raw.version,
            comments: raw.comments,
            group: raw.group,
            mpuri: raw.mpuri,
            user_fullname: raw.user_fullname,
            user_guid: raw.user_guid,
            user_uri: raw.user_uri,
        }))
    }
}

/// Strip an S/MIME envelope, returning the JSON document inside
fn extract_json(payload: &str) -> ImgsyncResult<&str> {
    let trimmed = payload.trim_start();
    if trimmed.starts_with('{') {
        return Ok(trimmed);
    }

    match (payload.find('{'), payload.rfind('}')) {
        (Some(start), Some(end)) if start < end => Ok(&payload[start..=end]),
        _ => Err(ImgsyncError::invalid_list(
            "payload does not contain a JSON document",
        )),
    }
}

/// Parse a HEPiX payload and evaluate it against `definition` at `now`
pub fn parse(
    payload: &str,
    definition: &SourceDefinition,
    now: DateTime<Utc>,
) -> ImgsyncResult<FetchedList> {
    let document: HepixDocument = serde_json::from_str(extract_json(payload)?)
        .map_err(|e| ImgsyncError::invalid_list(format!("invalid image definition: {}", e)))?;
    let list = document.imagelist;

    let images = list
        .images
        .into_iter()
        .map(|entry| Image::try_from(entry.image))
        .collect::<ImgsyncResult<Vec<_>>>()?;

    let expires = list
        .expires
        .as_deref()
        .map(|raw| {
            DateTime::parse_from_rfc3339(raw.trim())
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| {
                    ImgsyncError::invalid_list(format!("invalid expiry date '{}': {}", raw, e))
                })
        })
        .transpose()?;

    let endorser_dn = list.endorser.and_then(|e| e.x509.dn);
    let trusted = match (&definition.endorser, &endorser_dn) {
        (None, _) => true,
        (Some(pinned), Some(dn)) => pinned.trim() == dn.trim(),
        (Some(_), None) => false,
    };
    if !trusted {
        warn!(
            "List endorser {:?} does not match pinned endorser {:?}",
            endorser_dn, definition.endorser
        );
    }

    let verified = is_consistent(&images);

    Ok(FetchedList {
        identifier: list.identifier,
        title: list.title,
        endorser_dn,
        expired: expires.is_some_and(|at| at <= now),
        expires,
        trusted,
        verified,
        images,
    })
}

/// Identifiers are unique and every digest is a SHA-512 hex string
fn is_consistent(images: &[Image]) -> bool {
    let mut seen = HashSet::new();
    for image in images {
        if !seen.insert(image.identifier()) {
            warn!("Image '{}' is declared more than once", image.identifier());
            return false;
        }
        if !checksum::is_sha512_hex(image.sha512()) {
            warn!("Image '{}' has a malformed checksum", image.identifier());
            return false;
        }
    }
    true
}

#[cfg(test)]
pub(crate) mod fixtures {
    use serde_json::{json, Value};

    pub const ENDORSER_DN: &str = "/DC=org/DC=example/CN=Image Endorser";

    /// A complete `hv:image` entry
    pub fn image_entry(identifier: &str, uri: &str, sha512: &str) -> Value {
        json!({
            "hv:image": {
                "ad:group": "example.vo",
                "ad:mpuri": format!("https://marketplace.example.org/{identifier}"),
                "ad:user:fullname": "Jane Operator",
                "ad:user:guid": "1234",
                "ad:user:uri": "https://marketplace.example.org/users/1234",
                "dc:description": "Test image",
                "dc:identifier": identifier,
                "dc:title": format!("Image {identifier}"),
                "hv:hypervisor": "QEMU,KVM",
                "hv:format": "QCOW2",
                "hv:size": 1024,
                "hv:uri": uri,
                "hv:version": "1.0",
                "sl:arch": "x86_64",
                "sl:checksum:sha512": sha512,
                "sl:comments": "",
                "sl:os": "Linux",
                "sl:osname": "Ubuntu",
                "sl:osversion": "24.04"
            }
        })
    }

    /// A list document wrapping `entries`
    pub fn list_document(entries: Vec<Value>, expires: &str) -> String {
        json!({
            "hv:imagelist": {
                "dc:identifier": "0a1b2c3d",
                "dc:title": "Example list",
                "dc:date:created": "2024-01-01T00:00:00Z",
                "dc:date:expires": expires,
                "hv:endorser": {
                    "hv:x509": {
                        "dc:creator": "Example endorser",
                        "hv:ca": "/DC=org/DC=example/CN=Example CA",
                        "hv:dn": ENDORSER_DN,
                        "hv:email": "endorser@example.org"
                    }
                },
                "hv:images": entries,
                "hv:uri": "https://lists.example.org/list.json",
                "hv:version": "20240101"
            }
        })
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::transport::testing::MemoryTransport;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }

    fn digest() -> String {
        "ab".repeat(64)
    }

    fn definition() -> SourceDefinition {
        SourceDefinition::new("https://lists.example.org/list.json")
    }

    #[test]
    fn parses_complete_list() {
        let payload = list_document(
            vec![image_entry("img-1", "https://img.example.org/1", &digest())],
            "2030-01-01T00:00:00Z",
        );

        let fetched = parse(&payload, &definition(), now()).unwrap();

        assert_eq!(fetched.identifier.as_deref(), Some("0a1b2c3d"));
        assert_eq!(fetched.endorser_dn.as_deref(), Some(ENDORSER_DN));
        assert!(fetched.trusted && fetched.verified && !fetched.expired);
        assert_eq!(fetched.images.len(), 1);

        let meta = fetched.images[0].metadata();
        assert_eq!(meta.identifier, "img-1");
        assert_eq!(meta.size, 1024);
        assert_eq!(meta.format, "QCOW2");
        assert_eq!(meta.osname, "Ubuntu");
        assert!(fetched.images[0].location().is_none());
    }

    #[test]
    fn missing_field_invalidates_whole_list() {
        let mut broken = image_entry("img-2", "https://img.example.org/2", &digest());
        broken["hv:image"]
            .as_object_mut()
            .unwrap()
            .remove("sl:osversion");
        let payload = list_document(
            vec![
                image_entry("img-1", "https://img.example.org/1", &digest()),
                broken,
            ],
            "2030-01-01T00:00:00Z",
        );

        let err = parse(&payload, &definition(), now()).unwrap_err();
        assert!(matches!(err, ImgsyncError::InvalidImageList(ref reason) if reason.contains("sl:osversion")));
    }

    #[test]
    fn null_field_counts_as_missing() {
        let mut entry = image_entry("img-1", "https://img.example.org/1", &digest());
        entry["hv:image"]["hv:uri"] = Value::Null;
        let payload = list_document(vec![entry], "2030-01-01T00:00:00Z");

        assert!(matches!(
            parse(&payload, &definition(), now()),
            Err(ImgsyncError::InvalidImageList(_))
        ));
    }

    #[test]
    fn rejects_path_like_identifiers() {
        for identifier in ["../escape", "a/b", "..", "."] {
            let payload = list_document(
                vec![image_entry(identifier, "https://img.example.org/1", &digest())],
                "2030-01-01T00:00:00Z",
            );
            assert!(
                parse(&payload, &definition(), now()).is_err(),
                "accepted identifier {identifier}"
            );
        }
    }

    #[test]
    fn expired_list() {
        let payload = list_document(vec![], "2025-01-01T00:00:00Z");
        let fetched = parse(&payload, &definition(), now()).unwrap();
        assert!(fetched.expired);
    }

    #[test]
    fn pinned_endorser_must_match() {
        let payload = list_document(vec![], "2030-01-01T00:00:00Z");

        let mut pinned = definition();
        pinned.endorser = Some(ENDORSER_DN.to_string());
        assert!(parse(&payload, &pinned, now()).unwrap().trusted);

        pinned.endorser = Some("/DC=org/CN=Someone Else".to_string());
        assert!(!parse(&payload, &pinned, now()).unwrap().trusted);
    }

    #[test]
    fn duplicate_identifiers_fail_verification() {
        let payload = list_document(
            vec![
                image_entry("img-1", "https://img.example.org/1", &digest()),
                image_entry("img-1", "https://img.example.org/1b", &digest()),
            ],
            "2030-01-01T00:00:00Z",
        );
        let fetched = parse(&payload, &definition(), now()).unwrap();
        assert!(!fetched.verified);
    }

    #[test]
    fn malformed_checksum_fails_verification() {
        let payload = list_document(
            vec![image_entry("img-1", "https://img.example.org/1", "not-a-digest")],
            "2030-01-01T00:00:00Z",
        );
        let fetched = parse(&payload, &definition(), now()).unwrap();
        assert!(!fetched.verified);
    }

    #[test]
    fn unwraps_smime_envelope() {
        let json = list_document(vec![], "2030-01-01T00:00:00Z");
        let payload = format!(
            "MIME-Version: 1.0\r\nContent-Type: multipart/signed; boundary=\"XYZ\"\r\n\r\n--XYZ\r\nContent-Type: text/plain\r\n\r\n{json}\r\n--XYZ\r\nContent-Type: application/pkcs7-signature\r\n\r\nMIIGSAYJKoZIhvcNAQcCoIIGOTCCBjUCAQExCzAJ\r\n--XYZ--\r\n"
        );

        let fetched = parse(&payload, &definition(), now()).unwrap();
        assert_eq!(fetched.title.as_deref(), Some("Example list"));
    }

    #[test]
    fn garbage_payload_is_invalid() {
        assert!(matches!(
            parse("<html>Service unavailable</html>", &definition(), now()),
            Err(ImgsyncError::InvalidImageList(_))
        ));
    }

    #[test]
    fn fetch_reads_through_transport() {
        let transport = MemoryTransport::new();
        let def = definition();
        transport.insert(
            &def.url,
            list_document(
                vec![image_entry("img-1", "https://img.example.org/1", &digest())],
                "2999-01-01T00:00:00Z",
            ),
        );

        let fetched = HepixFormat.fetch("egi", &def, &transport).unwrap();
        assert_eq!(fetched.images.len(), 1);
        assert_eq!(transport.requests(), 1);
    }
}
