use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

pub const CONTRACT_ID: &str = "logbook.field_contract";
pub const CONTRACT_VERSION: &str = "1";

pub const DEFAULT_LAYOUT_ID: &str = "logbook_es.v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Date,
    Text,
    /// Durations summed in minutes.
    Time,
    /// Integer counters (landings).
    Count,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Date => "date",
            FieldKind::Text => "text",
            FieldKind::Time => "time",
            FieldKind::Count => "count",
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, FieldKind::Time | FieldKind::Count)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
}

// Column order of the paper logbook and of the headerless CSV exports.
pub const LOGBOOK_FIELDS_V1: [FieldDef; 24] = [
    FieldDef { name: "Fecha", kind: FieldKind::Date },
    FieldDef { name: "Origen", kind: FieldKind::Text },
    FieldDef { name: "Salida", kind: FieldKind::Text },
    FieldDef { name: "Destino", kind: FieldKind::Text },
    FieldDef { name: "Llegada", kind: FieldKind::Text },
    FieldDef { name: "Fabricante", kind: FieldKind::Text },
    FieldDef { name: "Matrícula", kind: FieldKind::Text },
    FieldDef { name: "SE", kind: FieldKind::Time },
    FieldDef { name: "ME", kind: FieldKind::Time },
    FieldDef { name: "Tiempo multipiloto", kind: FieldKind::Time },
    FieldDef { name: "Tiempo total de vuelo", kind: FieldKind::Time },
    FieldDef { name: "Nombre del PIC", kind: FieldKind::Text },
    FieldDef { name: "Landings Día", kind: FieldKind::Count },
    FieldDef { name: "Landings Noche", kind: FieldKind::Count },
    FieldDef { name: "Noche", kind: FieldKind::Time },
    FieldDef { name: "IFR", kind: FieldKind::Time },
    FieldDef { name: "Piloto al mando", kind: FieldKind::Time },
    FieldDef { name: "Co-piloto", kind: FieldKind::Time },
    FieldDef { name: "Doble mando", kind: FieldKind::Time },
    FieldDef { name: "Instructor", kind: FieldKind::Time },
    FieldDef { name: "Fecha simu", kind: FieldKind::Date },
    FieldDef { name: "Tipo", kind: FieldKind::Text },
    FieldDef { name: "Total de sesión", kind: FieldKind::Time },
    FieldDef { name: "Observaciones", kind: FieldKind::Text },
];

// Frozen layout descriptor measured on the blank logbook template. Compiled into the binary;
// runtime never reads it from the repository.
const DEFAULT_LAYOUT_V1_JSON: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../../docs/layouts/logbook_es.v1.json"
));

#[derive(Debug, Clone)]
pub struct ContractMetadata {
    pub contract_id: &'static str,
    pub contract_version: &'static str,
    pub contract_fingerprint_sha256: String,
    pub field_schema_hash_sha256: String,
    pub default_layout_id: &'static str,
    pub default_layout_hash_sha256: String,
}

pub fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        use std::fmt::Write;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

static FIELD_SCHEMA_HASH: OnceLock<String> = OnceLock::new();
static DEFAULT_LAYOUT_HASH: OnceLock<String> = OnceLock::new();
static CONTRACT_FINGERPRINT: OnceLock<String> = OnceLock::new();
static DEFAULT_LAYOUT_JSON_VALUE: OnceLock<Option<Value>> = OnceLock::new();

pub fn logbook_fields_v1() -> &'static [FieldDef] {
    &LOGBOOK_FIELDS_V1
}

pub fn field_def(name: &str) -> Option<&'static FieldDef> {
    LOGBOOK_FIELDS_V1.iter().find(|d| d.name == name)
}

pub fn field_kind(name: &str) -> FieldKind {
    field_def(name).map(|d| d.kind).unwrap_or(FieldKind::Text)
}

pub fn aggregate_fields_v1() -> impl Iterator<Item = &'static FieldDef> {
    LOGBOOK_FIELDS_V1.iter().filter(|d| d.kind.is_aggregate())
}

/// Resolves a field name ignoring case, as fillable forms name widgets in upper case.
pub fn field_def_case_insensitive(name: &str) -> Option<&'static FieldDef> {
    let wanted = name.trim().to_uppercase();
    LOGBOOK_FIELDS_V1
        .iter()
        .find(|d| d.name.to_uppercase() == wanted)
}

pub fn default_layout_v1_json() -> &'static str {
    DEFAULT_LAYOUT_V1_JSON
}

pub fn default_layout_v1_value() -> Option<&'static Value> {
    DEFAULT_LAYOUT_JSON_VALUE
        .get_or_init(|| serde_json::from_str(DEFAULT_LAYOUT_V1_JSON).ok())
        .as_ref()
}

pub fn field_schema_v1_hash_sha256() -> String {
    FIELD_SCHEMA_HASH
        .get_or_init(|| {
            let mut canonical = String::new();
            for def in &LOGBOOK_FIELDS_V1 {
                canonical.push_str(def.name);
                canonical.push('\t');
                canonical.push_str(def.kind.as_str());
                canonical.push('\n');
            }
            hex_sha256(canonical.as_bytes())
        })
        .clone()
}

pub fn default_layout_v1_hash_sha256() -> String {
    DEFAULT_LAYOUT_HASH
        .get_or_init(|| hex_sha256(DEFAULT_LAYOUT_V1_JSON.as_bytes()))
        .clone()
}

pub fn contract_fingerprint_sha256() -> String {
    CONTRACT_FINGERPRINT
        .get_or_init(|| {
            let mut hasher = Sha256::new();
            hasher.update(CONTRACT_ID.as_bytes());
            hasher.update(b"\n");
            hasher.update(CONTRACT_VERSION.as_bytes());
            hasher.update(b"\n");
            hasher.update(field_schema_v1_hash_sha256().as_bytes());
            hasher.update(b"\n");
            hasher.update(DEFAULT_LAYOUT_ID.as_bytes());
            hasher.update(b"\n");
            hasher.update(default_layout_v1_hash_sha256().as_bytes());
            let digest = hasher.finalize();
            let mut out = String::with_capacity(digest.len() * 2);
            for b in digest {
                use std::fmt::Write;
                let _ = write!(&mut out, "{:02x}", b);
            }
            out
        })
        .clone()
}

pub fn metadata() -> ContractMetadata {
    ContractMetadata {
        contract_id: CONTRACT_ID,
        contract_version: CONTRACT_VERSION,
        contract_fingerprint_sha256: contract_fingerprint_sha256(),
        field_schema_hash_sha256: field_schema_v1_hash_sha256(),
        default_layout_id: DEFAULT_LAYOUT_ID,
        default_layout_hash_sha256: default_layout_v1_hash_sha256(),
    }
}
