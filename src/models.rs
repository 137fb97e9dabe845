use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{SecondsFormat, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::error::LedgerError;

/// Current UTC time as an ISO-8601 string with microsecond precision.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Lowercase hex SHA-256 of `input`.
pub fn sha256_hex(input: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hex::encode(hasher.finalize())
}

/// True when `hash` starts with `difficulty` hex zeros.
pub fn meets_difficulty(hash: &str, difficulty: usize) -> bool {
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    CreateCase,
    AddDocument,
    ScheduleHearing,
    IssueJudgment,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::CreateCase => "create_case",
            Action::AddDocument => "add_document",
            Action::ScheduleHearing => "schedule_hearing",
            Action::IssueJudgment => "issue_judgment",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum CaseType {
    Civil,
    Penal,
    Laboral,
}

impl CaseType {
    pub const ALL: [CaseType; 3] = [CaseType::Civil, CaseType::Penal, CaseType::Laboral];

    pub fn as_str(&self) -> &'static str {
        match self {
            CaseType::Civil => "civil",
            CaseType::Penal => "penal",
            CaseType::Laboral => "laboral",
        }
    }
}

impl FromStr for CaseType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CaseType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                LedgerError::Validation(format!(
                    "invalid case type '{}', expected one of: civil, penal, laboral",
                    s
                ))
            })
    }
}

/// Lifecycle of a case. Ordering follows the only allowed direction of travel.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Presentado,
    EnProceso,
    Resuelto,
}

impl CaseStatus {
    /// Moves forward to `next`, never backwards.
    pub fn advance(self, next: CaseStatus) -> CaseStatus {
        self.max(next)
    }
}

/// Action-specific payload of a transaction.
///
/// Serialized without a tag: the owning transaction's `action` field already
/// names the variant, and the flat field set is what gets hashed. Reading it
/// back goes through [`ActionData::from_json`], which needs that action.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum ActionData {
    CreateCase {
        #[serde(rename = "type")]
        case_type: CaseType,
        description: String,
        status: CaseStatus,
        plaintiff_name_hash: String,
        defendant_name_hash: String,
    },
    AddDocument {
        document_name: String,
        document_hash: String,
        uploader: String,
        upload_date: String,
    },
    ScheduleHearing {
        hearing_type: String,
        date: String,
        location: String,
        scheduled_at: String,
    },
    IssueJudgment {
        ruling: String,
        verdict: String,
        details: String,
        judgment_date: String,
    },
    Genesis {
        description: String,
    },
}

impl ActionData {
    pub fn action(&self) -> Action {
        match self {
            ActionData::CreateCase { .. } | ActionData::Genesis { .. } => Action::CreateCase,
            ActionData::AddDocument { .. } => Action::AddDocument,
            ActionData::ScheduleHearing { .. } => Action::ScheduleHearing,
            ActionData::IssueJudgment { .. } => Action::IssueJudgment,
        }
    }

    /// The `type` field, present only on case creation.
    pub fn case_type(&self) -> Option<CaseType> {
        match self {
            ActionData::CreateCase { case_type, .. } => Some(*case_type),
            _ => None,
        }
    }

    /// Reads `value` as the payload of `action`. Any other field set is an error.
    pub fn from_json(action: Action, value: Value) -> Result<Self, serde_json::Error> {
        let variant = match action {
            Action::CreateCase if value.get("type").is_none() => "Genesis",
            Action::CreateCase => "CreateCase",
            Action::AddDocument => "AddDocument",
            Action::ScheduleHearing => "ScheduleHearing",
            Action::IssueJudgment => "IssueJudgment",
        };
        let mut tagged = serde_json::Map::new();
        tagged.insert(variant.to_string(), value);
        serde_json::from_value::<StrictData>(Value::Object(tagged)).map(ActionData::from)
    }
}

/// Externally tagged twin of [`ActionData`] with exact field sets.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
enum StrictData {
    CreateCase {
        #[serde(rename = "type")]
        case_type: CaseType,
        description: String,
        status: CaseStatus,
        plaintiff_name_hash: String,
        defendant_name_hash: String,
    },
    AddDocument {
        document_name: String,
        document_hash: String,
        uploader: String,
        upload_date: String,
    },
    ScheduleHearing {
        hearing_type: String,
        date: String,
        location: String,
        scheduled_at: String,
    },
    IssueJudgment {
        ruling: String,
        verdict: String,
        details: String,
        judgment_date: String,
    },
    Genesis {
        description: String,
    },
}

impl From<StrictData> for ActionData {
    fn from(data: StrictData) -> Self {
        match data {
            StrictData::CreateCase {
                case_type,
                description,
                status,
                plaintiff_name_hash,
                defendant_name_hash,
            } => ActionData::CreateCase {
                case_type,
                description,
                status,
                plaintiff_name_hash,
                defendant_name_hash,
            },
            StrictData::AddDocument {
                document_name,
                document_hash,
                uploader,
                upload_date,
            } => ActionData::AddDocument {
                document_name,
                document_hash,
                uploader,
                upload_date,
            },
            StrictData::ScheduleHearing {
                hearing_type,
                date,
                location,
                scheduled_at,
            } => ActionData::ScheduleHearing {
                hearing_type,
                date,
                location,
                scheduled_at,
            },
            StrictData::IssueJudgment {
                ruling,
                verdict,
                details,
                judgment_date,
            } => ActionData::IssueJudgment {
                ruling,
                verdict,
                details,
                judgment_date,
            },
            StrictData::Genesis { description } => ActionData::Genesis { description },
        }
    }
}

/// One judicial action. Never mutated once built.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub(crate) case_id: String,
    pub(crate) action: Action,
    pub(crate) parties: BTreeMap<String, String>,
    pub(crate) judge: String,
    pub(crate) data: ActionData,
    pub(crate) timestamp: String,
}

#[derive(Deserialize)]
struct TransactionFields {
    case_id: String,
    action: Action,
    parties: BTreeMap<String, String>,
    judge: String,
    data: Value,
    timestamp: String,
}

impl<'de> Deserialize<'de> for Transaction {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let fields = TransactionFields::deserialize(deserializer)?;
        let data = ActionData::from_json(fields.action, fields.data).map_err(de::Error::custom)?;
        Ok(Transaction {
            case_id: fields.case_id,
            action: fields.action,
            parties: fields.parties,
            judge: fields.judge,
            data,
            timestamp: fields.timestamp,
        })
    }
}

impl Transaction {
    pub fn new(
        case_id: impl Into<String>,
        parties: BTreeMap<String, String>,
        judge: impl Into<String>,
        data: ActionData,
    ) -> Self {
        Transaction {
            case_id: case_id.into(),
            action: data.action(),
            parties,
            judge: judge.into(),
            data,
            timestamp: now_iso(),
        }
    }

    pub fn case_id(&self) -> &str {
        &self.case_id
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn parties(&self) -> &BTreeMap<String, String> {
        &self.parties
    }

    pub fn judge(&self) -> &str {
        &self.judge
    }

    pub fn data(&self) -> &ActionData {
        &self.data
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Key-sorted JSON value used as hashing input.
    pub fn to_canonical_form(&self) -> Value {
        json!({
            "case_id": self.case_id,
            "action": self.action,
            "parties": self.parties,
            "judge": self.judge,
            "data": self.data,
            "timestamp": self.timestamp,
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub(crate) index: u64,
    pub(crate) transactions: Vec<Transaction>,
    pub(crate) previous_hash: String,
    pub(crate) timestamp: String,
    pub(crate) nonce: u64,
    pub(crate) hash: String,
}

impl Block {
    pub fn new(index: u64, transactions: Vec<Transaction>, previous_hash: impl Into<String>) -> Self {
        let mut block = Block {
            index,
            transactions,
            previous_hash: previous_hash.into(),
            timestamp: now_iso(),
            nonce: 0,
            hash: String::new(),
        };
        block.hash = block.compute_hash();
        block
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// SHA-256 over the compact, key-sorted JSON of every field but `hash`.
    pub fn compute_hash(&self) -> String {
        let transactions: Vec<Value> = self
            .transactions
            .iter()
            .map(Transaction::to_canonical_form)
            .collect();
        let canonical = json!({
            "index": self.index,
            "transactions": transactions,
            "previous_hash": self.previous_hash,
            "timestamp": self.timestamp,
            "nonce": self.nonce,
        });
        sha256_hex(canonical.to_string().as_bytes())
    }

    /// Proof of work: bumps the nonce until the hash has `difficulty` leading zeros.
    pub fn seal(&mut self, difficulty: usize) {
        while !meets_difficulty(&self.hash, difficulty) {
            self.nonce += 1;
            self.hash = self.compute_hash();
        }
        log::debug!(
            "block #{} sealed: {}... (nonce: {})",
            self.index,
            &self.hash[..16],
            self.nonce
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document_tx() -> Transaction {
        let mut parties = BTreeMap::new();
        parties.insert("plaintiff".to_string(), "Demandante_abc".to_string());
        Transaction::new(
            "EXP-9",
            parties,
            "Juez_X",
            ActionData::AddDocument {
                document_name: "doc.pdf".to_string(),
                document_hash: sha256_hex(b"hello"),
                uploader: "clerk".to_string(),
                upload_date: now_iso(),
            },
        )
    }

    #[test]
    fn sha256_hex_is_lowercase_hex() {
        assert_eq!(
            sha256_hex(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn canonical_form_has_sorted_keys() {
        let canonical = document_tx().to_canonical_form().to_string();
        let positions: Vec<usize> = ["\"action\"", "\"case_id\"", "\"data\"", "\"judge\"", "\"parties\"", "\"timestamp\""]
            .iter()
            .map(|key| canonical.find(key).unwrap())
            .collect();
        let mut sorted = positions.clone();
        sorted.sort();
        assert_eq!(positions, sorted);
        assert!(!canonical.contains(": "));
    }

    #[test]
    fn action_follows_data_variant() {
        let tx = document_tx();
        assert_eq!(tx.action(), Action::AddDocument);
        let value = serde_json::to_value(&tx).unwrap();
        assert_eq!(value["action"], "add_document");
        assert_eq!(value["data"]["document_name"], "doc.pdf");
    }

    #[test]
    fn compute_hash_is_pure() {
        let block = Block::new(1, vec![document_tx()], "0");
        assert_eq!(block.compute_hash(), block.compute_hash());
        assert_eq!(block.hash(), block.compute_hash());
    }

    #[test]
    fn seal_reaches_requested_difficulty() {
        for difficulty in 0..=2 {
            let mut block = Block::new(1, vec![document_tx()], "0");
            block.seal(difficulty);
            assert!(meets_difficulty(block.hash(), difficulty));
            assert_eq!(block.hash(), block.compute_hash());
        }
    }

    #[test]
    fn nonce_changes_hash() {
        let mut block = Block::new(1, vec![document_tx()], "0");
        let before = block.compute_hash();
        block.nonce += 1;
        assert_ne!(before, block.compute_hash());
    }

    #[test]
    fn case_type_parsing() {
        assert_eq!("penal".parse::<CaseType>().unwrap(), CaseType::Penal);
        assert!(matches!(
            "mercantil".parse::<CaseType>(),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn status_only_moves_forward() {
        assert_eq!(
            CaseStatus::Presentado.advance(CaseStatus::EnProceso),
            CaseStatus::EnProceso
        );
        assert_eq!(
            CaseStatus::Resuelto.advance(CaseStatus::EnProceso),
            CaseStatus::Resuelto
        );
    }

    #[test]
    fn untagged_data_roundtrips_through_export() {
        let tx = document_tx();
        let json = serde_json::to_string(&tx).unwrap();
        let back: Transaction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tx);
    }

    fn create_case_tx() -> Transaction {
        Transaction::new(
            "EXP-3",
            BTreeMap::new(),
            "Juez_X",
            ActionData::CreateCase {
                case_type: CaseType::Laboral,
                description: "despido".to_string(),
                status: CaseStatus::Presentado,
                plaintiff_name_hash: "a".repeat(16),
                defendant_name_hash: "b".repeat(16),
            },
        )
    }

    #[test]
    fn creation_and_genesis_payloads_read_back_as_themselves() {
        let tx = create_case_tx();
        let back: Transaction = serde_json::from_value(serde_json::to_value(&tx).unwrap()).unwrap();
        assert_eq!(back, tx);

        let genesis = Transaction::new(
            "GENESIS-0",
            BTreeMap::new(),
            "Sistema_Judicial",
            ActionData::Genesis {
                description: "inicio".to_string(),
            },
        );
        let back: Transaction =
            serde_json::from_value(serde_json::to_value(&genesis).unwrap()).unwrap();
        assert_eq!(back.data(), genesis.data());
    }

    #[test]
    fn unknown_case_type_is_rejected_not_downgraded() {
        let mut value = serde_json::to_value(create_case_tx()).unwrap();
        value["data"]["type"] = json!("mercantil");
        assert!(serde_json::from_value::<Transaction>(value).is_err());
    }

    #[test]
    fn action_must_match_data() {
        let mut value = serde_json::to_value(create_case_tx()).unwrap();
        value["action"] = json!("add_document");
        assert!(serde_json::from_value::<Transaction>(value).is_err());

        let mut value = serde_json::to_value(document_tx()).unwrap();
        value["action"] = json!("issue_judgment");
        assert!(serde_json::from_value::<Transaction>(value).is_err());
    }

    #[test]
    fn extra_payload_fields_are_rejected() {
        let mut value = serde_json::to_value(document_tx()).unwrap();
        value["data"]["content"] = json!("raw document text");
        assert!(serde_json::from_value::<Transaction>(value).is_err());
    }
}
