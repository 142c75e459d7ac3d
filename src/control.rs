use core::error::Error;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::model::{MonitoredTimeframes, TimeframeRole};

pub const KEY_EMAIL: &str = "UserEmail";
pub const KEY_PASSWORD: &str = "UserPassword";
pub const KEY_SYMBOL: &str = "Symbol";
pub const KEY_ACTIVE: &str = "Active";

/// Pick the most recently modified immediate subdirectory of `base`.
pub fn latest_session_folder(base: &Path) -> io::Result<PathBuf> {
    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in std::fs::read_dir(base)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if !meta.is_dir() {
            continue;
        }
        let modified = meta.modified()?;
        if newest.as_ref().is_none_or(|(t, _)| modified > *t) {
            newest = Some((modified, entry.path()));
        }
    }
    newest.map(|(_, path)| path).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("No session folders found in {}", base.display()),
        )
    })
}

/// Decode UTF-16 text. A BOM selects the byte order; without one the bytes
/// are taken as little endian, but only if they look like UTF-16 at all (at
/// least one NUL byte), so plain 8-bit text is rejected instead of being
/// turned into garbage.
pub fn decode_utf16(bytes: &[u8]) -> Result<String, String> {
    let (body, big_endian) = match bytes {
        [0xFF, 0xFE, rest @ ..] => (rest, false),
        [0xFE, 0xFF, rest @ ..] => (rest, true),
        _ if bytes.is_empty() => return Ok(String::new()),
        _ if !bytes.contains(&0) => return Err("no BOM and no UTF-16 code units".into()),
        _ => (bytes, false),
    };
    if body.len() % 2 != 0 {
        return Err(format!("odd byte length {}", body.len()));
    }
    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|pair| {
            if big_endian {
                u16::from_be_bytes([pair[0], pair[1]])
            } else {
                u16::from_le_bytes([pair[0], pair[1]])
            }
        })
        .collect();
    String::from_utf16(&units).map_err(|e| e.to_string())
}

/// UTF-16 first, UTF-8 (BOM tolerated) when that fails.
pub fn decode_lenient(bytes: &[u8]) -> Result<String, String> {
    decode_utf16(bytes).or_else(|utf16_err| {
        let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        String::from_utf8(body.to_vec())
            .map_err(|utf8_err| format!("not UTF-16 ({utf16_err}) nor UTF-8 ({utf8_err})"))
    })
}

/// `Active:` line whose text contains "false" in any casing.
pub fn is_deactivated(text: &str) -> bool {
    text.lines().any(|line| {
        line.trim().starts_with("Active:") && line.to_lowercase().contains("false")
    })
}

/// Flat key/value view of a control file. Keys are case-sensitive.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ControlRecord {
    entries: HashMap<String, String>,
}

impl ControlRecord {
    /// Split each line on its first colon; lines without one are skipped.
    pub fn parse(text: &str) -> Self {
        let entries = text
            .lines()
            .filter_map(|line| line.split_once(':'))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();
        Self { entries }
    }

    pub fn load(path: &Path) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let bytes = std::fs::read(path)?;
        let text = decode_utf16(&bytes)
            .map_err(|e| format!("{} is not UTF-16 text: {e}", path.display()))?;
        let record = Self::parse(&text);
        debug!(path = %path.display(), keys = record.entries.len(), "Parsed control file");
        Ok(record)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn require(&self, key: &str) -> Result<&str, String> {
        self.get(key)
            .ok_or_else(|| format!("Control file is missing required key {key}"))
    }

    pub fn timeframes(&self) -> MonitoredTimeframes {
        MonitoredTimeframes::from_codes(|role: TimeframeRole| self.get(role.key()))
    }
}

impl Debug for ControlRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let mut keys: Vec<_> = self.entries.keys().collect();
        keys.sort();
        let mut map = f.debug_map();
        for key in keys {
            if key == KEY_PASSWORD {
                map.entry(key, &"<redacted>");
            } else {
                map.entry(key, &self.entries[key]);
            }
        }
        map.finish()
    }
}

/// Everything the run needs out of the control file.
#[derive(Clone)]
pub struct SessionInfo {
    pub folder: PathBuf,
    pub control_file: PathBuf,
    pub email: String,
    pub password: String,
    pub symbol: String,
    pub timeframes: MonitoredTimeframes,
}

impl SessionInfo {
    pub fn from_record(
        folder: &Path,
        control_file: &Path,
        record: &ControlRecord,
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        Ok(Self {
            folder: folder.to_path_buf(),
            control_file: control_file.to_path_buf(),
            email: record.require(KEY_EMAIL)?.to_string(),
            password: record.require(KEY_PASSWORD)?.to_string(),
            symbol: record.require(KEY_SYMBOL)?.to_string(),
            timeframes: record.timeframes(),
        })
    }

    /// Locate the newest session under `base`, then read its control file.
    pub fn discover(
        base: &Path,
        control_file_name: &str,
    ) -> Result<(Self, ControlRecord), Box<dyn Error + Send + Sync>> {
        let folder = latest_session_folder(base)?;
        let control_file = folder.join(control_file_name);
        if !control_file.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{control_file_name} not found in {}", folder.display()),
            )
            .into());
        }
        let record = ControlRecord::load(&control_file)?;
        let info = Self::from_record(&folder, &control_file, &record)?;
        Ok((info, record))
    }
}

impl Debug for SessionInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("SessionInfo")
            .field("folder", &self.folder)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("symbol", &self.symbol)
            .field("timeframes", &self.timeframes.labels())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Timeframe;
    use std::time::{Duration, SystemTime};
    use tempfile::tempdir;

    const SAMPLE: &str = "UserEmail: trader@example.com\r\n\
UserPassword: hunter2:with:colons\r\n\
Symbol: EURUSDm\r\n\
LowerTF: M1\r\n\
BaseTF: M15\r\n\
HigherTF: H1\r\n\
Active: true\r\n";

    fn utf16le_with_bom(text: &str) -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xFE];
        bytes.extend(text.encode_utf16().flat_map(u16::to_le_bytes));
        bytes
    }

    #[test]
    fn test_parse_splits_on_first_colon() {
        let record = ControlRecord::parse(SAMPLE);
        assert_eq!(record.get(KEY_PASSWORD), Some("hunter2:with:colons"));
        assert_eq!(record.get(KEY_SYMBOL), Some("EURUSDm"));
        assert_eq!(record.get("symbol"), None);
    }

    #[test]
    fn test_timeframe_labels_from_record() {
        let record = ControlRecord::parse(SAMPLE);
        assert_eq!(
            record.timeframes().labels(),
            vec!["1 minute", "15 minutes", "1 hour"]
        );
    }

    #[test]
    fn test_unrecognized_timeframe_role_is_omitted() {
        let record = ControlRecord::parse("LowerTF: M2\nBaseTF: H4\nHigherTF: D1\n");
        let monitored = record.timeframes();
        assert_eq!(monitored.labels(), vec!["4 hours", "1 day"]);
        assert_eq!(monitored.get(TimeframeRole::Base), Some(Timeframe::H4));
    }

    #[test]
    fn test_decode_utf16_variants() {
        assert_eq!(decode_utf16(&utf16le_with_bom("Active: true")).unwrap(), "Active: true");

        let mut be = vec![0xFE, 0xFF];
        be.extend("Symbol: X".encode_utf16().flat_map(u16::to_be_bytes));
        assert_eq!(decode_utf16(&be).unwrap(), "Symbol: X");

        let no_bom: Vec<u8> = "BaseTF: M5".encode_utf16().flat_map(u16::to_le_bytes).collect();
        assert_eq!(decode_utf16(&no_bom).unwrap(), "BaseTF: M5");

        assert!(decode_utf16(b"Active: false").is_err());
        assert!(decode_utf16(&[0xFF, 0xFE, 0x41]).is_err());
    }

    #[test]
    fn test_decode_lenient_falls_back_to_utf8() {
        assert_eq!(decode_lenient(b"Active: false\n").unwrap(), "Active: false\n");
        assert_eq!(decode_lenient(b"\xEF\xBB\xBFActive: x").unwrap(), "Active: x");
        assert_eq!(decode_lenient(&utf16le_with_bom("A: b")).unwrap(), "A: b");
    }

    #[test]
    fn test_is_deactivated() {
        assert!(is_deactivated("Symbol: X\nActive: false\n"));
        assert!(is_deactivated("  Active: FALSE"));
        assert!(is_deactivated("Active: False  "));
        assert!(!is_deactivated("Active: true\n"));
        assert!(!is_deactivated("Inactive: false\n"));
        assert!(!is_deactivated(""));
    }

    #[test]
    fn test_debug_redacts_password() {
        let record = ControlRecord::parse(SAMPLE);
        let rendered = format!("{record:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_latest_session_folder_picks_newest() {
        let dir = tempdir().unwrap();
        let old = dir.path().join("old");
        let new = dir.path().join("new");
        std::fs::create_dir(&old).unwrap();
        std::fs::create_dir(&new).unwrap();
        std::fs::write(dir.path().join("stray.txt"), "x").unwrap();

        let past = SystemTime::now() - Duration::from_secs(3_600);
        std::fs::File::open(&old).unwrap().set_modified(past).unwrap();

        assert_eq!(latest_session_folder(dir.path()).unwrap(), new);
    }

    #[test]
    fn test_latest_session_folder_not_found() {
        let dir = tempdir().unwrap();
        let err = latest_session_folder(dir.path()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_discover_reads_control_file() {
        let dir = tempdir().unwrap();
        let session = dir.path().join("session-1");
        std::fs::create_dir(&session).unwrap();
        std::fs::write(session.join("init.txt"), utf16le_with_bom(SAMPLE)).unwrap();

        let (info, _) = SessionInfo::discover(dir.path(), "init.txt").unwrap();
        assert_eq!(info.folder, session);
        assert_eq!(info.email, "trader@example.com");
        assert_eq!(info.symbol, "EURUSDm");
        assert_eq!(info.timeframes.len(), 3);
        assert!(!format!("{info:?}").contains("hunter2"));
    }

    #[test]
    fn test_discover_requires_control_file_and_keys() {
        let dir = tempdir().unwrap();
        let session = dir.path().join("session-1");
        std::fs::create_dir(&session).unwrap();
        assert!(SessionInfo::discover(dir.path(), "init.txt").is_err());

        std::fs::write(
            session.join("init.txt"),
            utf16le_with_bom("UserEmail: a@b.c\nSymbol: EURUSD\n"),
        )
        .unwrap();
        let err = SessionInfo::discover(dir.path(), "init.txt").unwrap_err();
        assert!(err.to_string().contains(KEY_PASSWORD));
    }
}
