use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{codec, error::ValidationError};

/// Number of liftable shafts on the loom; one bit per shaft in a row byte.
pub const SHAFT_COUNT: usize = 8;

/// Suffix the loom filesystem stores liftplans under.
pub const LIFTPLAN_FILE_SUFFIX: &str = ".json";

/// The firmware copies the `name` query parameter into a 64 byte buffer.
pub const MAX_LIFTPLAN_FILE_NAME_BYTES: usize = 63;

/// One liftplan step: `0[i]` is shaft `i + 1`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Row(pub [bool; SHAFT_COUNT]);

impl Row {
    pub fn blank() -> Self {
        Self::default()
    }

    pub fn is_lifted(&self, shaft: usize) -> bool {
        self.0.get(shaft).copied().unwrap_or(false)
    }

    pub fn toggle(&mut self, shaft: usize) -> Result<(), ValidationError> {
        let cell = self
            .0
            .get_mut(shaft)
            .ok_or(ValidationError::ShaftOutOfRange {
                shaft: shaft + 1,
                max: SHAFT_COUNT,
            })?;
        *cell = !*cell;
        Ok(())
    }

    pub fn lifted_count(&self) -> usize {
        self.0.iter().filter(|lifted| **lifted).count()
    }
}

impl From<[bool; SHAFT_COUNT]> for Row {
    fn from(value: [bool; SHAFT_COUNT]) -> Self {
        Self(value)
    }
}

/// Parses the text form used on the command line, shaft 1 first:
/// `1`/`#` lifted, `0`/`.` down.
impl FromStr for Row {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidRowPattern {
            value: s.to_string(),
        };
        let cells: Vec<char> = s.trim().chars().collect();
        if cells.len() != SHAFT_COUNT {
            return Err(invalid());
        }
        let mut row = Row::blank();
        for (shaft, cell) in cells.into_iter().enumerate() {
            row.0[shaft] = match cell {
                '1' | '#' => true,
                '0' | '.' => false,
                _ => return Err(invalid()),
            };
        }
        Ok(row)
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for lifted in self.0 {
            f.write_str(if lifted { "#" } else { "." })?;
        }
        Ok(())
    }
}

/// Ordered rows of a weaving pattern. This is the source of truth for
/// editing; tables and previews are projections of it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiftPlan {
    rows: Vec<Row>,
}

impl LiftPlan {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    /// Starting point of the editor: a single row with every shaft down.
    pub fn blank() -> Self {
        Self {
            rows: vec![Row::blank()],
        }
    }

    pub fn from_hex<S: AsRef<str>>(hexes: &[S]) -> Result<Self, ValidationError> {
        Ok(Self {
            rows: codec::decode_plan(hexes)?,
        })
    }

    /// Replaces the whole content. On error the plan is left untouched.
    pub fn populate_from_hex<S: AsRef<str>>(&mut self, hexes: &[S]) -> Result<(), ValidationError> {
        self.rows = codec::decode_plan(hexes)?;
        Ok(())
    }

    pub fn to_hex(&self) -> Vec<String> {
        codec::encode_plan(&self.rows)
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push_row(&mut self, row: Row) {
        self.rows.push(row);
    }

    pub fn push_blank_row(&mut self) {
        self.rows.push(Row::blank());
    }

    pub fn remove_last_row(&mut self) -> Option<Row> {
        self.rows.pop()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    /// `row` is zero based, `shaft` is zero based (shaft 1 is index 0).
    pub fn toggle(&mut self, row: usize, shaft: usize) -> Result<(), ValidationError> {
        let len = self.rows.len();
        self.rows
            .get_mut(row)
            .ok_or(ValidationError::RowOutOfRange { row, len })?
            .toggle(shaft)
    }
}

/// Name of a liftplan as the loom lists it (usually with the `.json` suffix).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LiftplanName(String);

impl LiftplanName {
    pub fn new(raw: impl AsRef<str>) -> Result<Self, ValidationError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name without the storage suffix, for presentation.
    pub fn display_name(&self) -> &str {
        self.0
            .strip_suffix(LIFTPLAN_FILE_SUFFIX)
            .unwrap_or(&self.0)
    }

    /// File name the loom persists this liftplan under.
    pub fn file_name(&self) -> Result<String, ValidationError> {
        let mut file_name: String = self
            .0
            .chars()
            .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
            .collect();
        if !file_name.ends_with(LIFTPLAN_FILE_SUFFIX) {
            file_name.push_str(LIFTPLAN_FILE_SUFFIX);
        }
        if file_name.len() > MAX_LIFTPLAN_FILE_NAME_BYTES {
            return Err(ValidationError::NameTooLong {
                len: file_name.len(),
                name: file_name,
                max: MAX_LIFTPLAN_FILE_NAME_BYTES,
            });
        }
        Ok(file_name)
    }

    /// True when both names refer to the same stored file.
    pub fn same_file(&self, other: &LiftplanName) -> bool {
        self.display_name() == other.display_name()
    }
}

impl fmt::Display for LiftplanName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for LiftplanName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LiftplanName> for String {
    fn from(value: LiftplanName) -> Self {
        value.0
    }
}

impl FromStr for LiftplanName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoomState {
    /// The firmware reports `init` while it boots; it accepts the same
    /// commands as idle.
    #[default]
    #[serde(alias = "init")]
    Idle,
    Running,
    Paused,
}

impl LoomState {
    /// Polling and the editing lock apply in these states.
    pub fn is_active(self) -> bool {
        matches!(self, LoomState::Running | LoomState::Paused)
    }

    /// Transition table; `None` means the command is illegal here.
    pub fn transition(self, command: LoomCommandKind) -> Option<LoomState> {
        match (self, command) {
            (LoomState::Idle, LoomCommandKind::Start) => Some(LoomState::Running),
            (LoomState::Running, LoomCommandKind::Pause) => Some(LoomState::Paused),
            (LoomState::Paused, LoomCommandKind::Continue) => Some(LoomState::Running),
            (LoomState::Running | LoomState::Paused, LoomCommandKind::Stop) => {
                Some(LoomState::Idle)
            }
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LoomState::Idle => "idle",
            LoomState::Running => "running",
            LoomState::Paused => "paused",
        }
    }
}

impl fmt::Display for LoomState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoomCommandKind {
    Start,
    Pause,
    Continue,
    Stop,
}

impl LoomCommandKind {
    pub const ALL: [LoomCommandKind; 4] = [
        LoomCommandKind::Start,
        LoomCommandKind::Pause,
        LoomCommandKind::Continue,
        LoomCommandKind::Stop,
    ];

    /// Last path segment of the command endpoint.
    pub fn as_str(self) -> &'static str {
        match self {
            LoomCommandKind::Start => "start",
            LoomCommandKind::Pause => "pause",
            LoomCommandKind::Continue => "continue",
            LoomCommandKind::Stop => "stop",
        }
    }
}

impl fmt::Display for LoomCommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client-side copy of the loom status. `index` only means something while
/// the loom is not idle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoomInfo {
    pub state: LoomState,
    pub active_liftplan: Option<LiftplanName>,
    pub index: u32,
    pub liftplan_length: Option<u32>,
}

impl LoomInfo {
    pub fn idle() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartCommand {
    pub liftplan: LiftplanName,
    pub start_position: u32,
}

/// Network settings in plain text; the wire form base64-encodes the password.
#[derive(Clone, PartialEq, Eq)]
pub struct WifiInfo {
    pub hostname: String,
    pub ssid: String,
    pub password: String,
}

impl WifiInfo {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.hostname.trim().is_empty() {
            return Err(ValidationError::EmptyField { field: "hostname" });
        }
        if self.ssid.trim().is_empty() {
            return Err(ValidationError::EmptyField { field: "SSID" });
        }
        if self.password.is_empty() {
            return Err(ValidationError::EmptyField { field: "password" });
        }
        Ok(())
    }
}

impl fmt::Debug for WifiInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WifiInfo")
            .field("hostname", &self.hostname)
            .field("ssid", &self.ssid)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_table_matches_loom_commands() {
        use LoomCommandKind::*;
        use LoomState::*;

        assert_eq!(Idle.transition(Start), Some(Running));
        assert_eq!(Running.transition(Pause), Some(Paused));
        assert_eq!(Paused.transition(Continue), Some(Running));
        assert_eq!(Running.transition(Stop), Some(Idle));
        assert_eq!(Paused.transition(Stop), Some(Idle));

        assert_eq!(Idle.transition(Pause), None);
        assert_eq!(Idle.transition(Continue), None);
        assert_eq!(Idle.transition(Stop), None);
        assert_eq!(Running.transition(Start), None);
        assert_eq!(Running.transition(Continue), None);
        assert_eq!(Paused.transition(Start), None);
        assert_eq!(Paused.transition(Pause), None);
    }

    #[test]
    fn init_state_reads_as_idle() {
        let state: LoomState = serde_json::from_str("\"init\"").expect("parse");
        assert_eq!(state, LoomState::Idle);
        assert_eq!(
            serde_json::to_string(&LoomState::Paused).expect("serialize"),
            "\"paused\""
        );
    }

    #[test]
    fn liftplan_name_is_trimmed_and_rejects_empty() {
        assert_eq!(LiftplanName::new("   "), Err(ValidationError::EmptyName));
        assert_eq!(LiftplanName::new("").unwrap_err(), ValidationError::EmptyName);
        let name = LiftplanName::new("  twill ").expect("name");
        assert_eq!(name.as_str(), "twill");
    }

    #[test]
    fn file_name_appends_suffix_once_and_replaces_separators() {
        let name = LiftplanName::new("shop/twill").expect("name");
        assert_eq!(name.file_name().expect("file"), "shop_twill.json");

        let listed = LiftplanName::new("twill.json").expect("name");
        assert_eq!(listed.file_name().expect("file"), "twill.json");
        assert_eq!(listed.display_name(), "twill");
        assert!(listed.same_file(&LiftplanName::new("twill").expect("name")));
    }

    #[test]
    fn file_name_respects_firmware_buffer() {
        let name = LiftplanName::new("x".repeat(58)).expect("name");
        assert_eq!(name.file_name().expect("fits").len(), 63);

        let too_long = LiftplanName::new("x".repeat(59)).expect("name");
        assert!(matches!(
            too_long.file_name(),
            Err(ValidationError::NameTooLong { len: 64, .. })
        ));
    }

    #[test]
    fn name_from_wire_is_validated() {
        let name: LiftplanName = serde_json::from_str("\" twill.json \"").expect("parse");
        assert_eq!(name.as_str(), "twill.json");
        assert!(serde_json::from_str::<LiftplanName>("\"  \"").is_err());
        assert!(serde_json::from_str::<StartCommand>(
            r#"{"liftplan":"","start_position":0}"#
        )
        .is_err());
        assert_eq!(serde_json::to_string(&name).expect("serialize"), "\"twill.json\"");
    }

    #[test]
    fn row_text_form_parses_and_prints_shaft_one_first() {
        let row: Row = "10100000".parse().expect("row");
        assert!(row.is_lifted(0));
        assert!(!row.is_lifted(1));
        assert!(row.is_lifted(2));
        assert_eq!(row.to_string(), "#.#.....");
        assert_eq!("#.#.....".parse::<Row>().expect("row"), row);

        assert!("1010".parse::<Row>().is_err());
        assert!("1010000x".parse::<Row>().is_err());
    }

    #[test]
    fn plan_editing_operations() {
        let mut plan = LiftPlan::blank();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.to_hex(), vec!["0x00"]);

        plan.toggle(0, 0).expect("toggle");
        plan.toggle(0, 2).expect("toggle");
        plan.push_blank_row();
        assert_eq!(plan.to_hex(), vec!["0x05", "0x00"]);

        assert_eq!(
            plan.toggle(5, 0),
            Err(ValidationError::RowOutOfRange { row: 5, len: 2 })
        );
        assert_eq!(
            plan.toggle(0, 8),
            Err(ValidationError::ShaftOutOfRange { shaft: 9, max: 8 })
        );

        assert_eq!(plan.remove_last_row(), Some(Row::blank()));
        plan.clear();
        assert!(plan.is_empty());
        assert_eq!(plan.remove_last_row(), None);
    }

    #[test]
    fn populate_from_hex_is_idempotent() {
        let input = ["0x05", "0xff", "0x80"];
        let mut plan = LiftPlan::blank();

        plan.populate_from_hex(&input).expect("first populate");
        let first = plan.clone();
        plan.populate_from_hex(&input).expect("second populate");

        assert_eq!(plan.len(), 3);
        assert_eq!(plan, first);
    }

    #[test]
    fn failed_populate_keeps_previous_rows() {
        let mut plan = LiftPlan::from_hex(&["0x01"]).expect("plan");
        assert!(plan.populate_from_hex(&["0x02", "0x1ff"]).is_err());
        assert_eq!(plan.to_hex(), vec!["0x01"]);
    }

    #[test]
    fn wifi_validation_and_redacted_debug() {
        let info = WifiInfo {
            hostname: "loom".into(),
            ssid: "workshop".into(),
            password: "hunter2".into(),
        };
        assert_eq!(info.validate(), Ok(()));
        assert!(!format!("{info:?}").contains("hunter2"));

        let missing_ssid = WifiInfo {
            ssid: " ".into(),
            ..info
        };
        assert_eq!(
            missing_ssid.validate(),
            Err(ValidationError::EmptyField { field: "SSID" })
        );
    }
}
