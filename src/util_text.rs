const MIST_PER_SUI: u64 = 1_000_000_000;

/// Format a MIST amount in human-readable form
/// Examples: "1 SUI", "0.5000 SUI", "1200 MIST"
pub fn format_sui(mist: u64) -> String {
    if mist == 0 {
        "0 SUI".to_string()
    } else if mist % MIST_PER_SUI == 0 {
        format!("{} SUI", mist / MIST_PER_SUI)
    } else if mist >= MIST_PER_SUI / 10_000 {
        let sui = mist as f64 / MIST_PER_SUI as f64;
        format!("{sui:.4} SUI")
    } else {
        format!("{mist} MIST")
    }
}

/// Sui JSON-RPC encodes `u64` values as strings; accept both and write strings back.
pub mod u64_string {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &u64, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&v.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Num(u64),
            Str(String),
        }
        match Raw::deserialize(d)? {
            Raw::Num(n) => Ok(n),
            Raw::Str(s) => s.trim().parse().map_err(de::Error::custom),
        }
    }
}

/// Read a `u64` out of a JSON value that may be a number or a numeric string.
pub fn json_u64(v: &serde_json::Value) -> Option<u64> {
    match v {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
