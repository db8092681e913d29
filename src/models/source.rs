//! ODIM source string handling (`WMO:02606,RAD:SE50,PLC:Angelholm,NOD:seang`).

use regex::Regex;
use std::sync::LazyLock;

static CMT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"CMT:[^,]+").expect("CMT pattern is valid"));

/// Parsed identifiers of an ODIM `what/source` string
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OdimSource {
    pub wmo: Option<String>,
    pub rad: Option<String>,
    pub nod: Option<String>,
    pub plc: Option<String>,
    pub org: Option<String>,
    pub cmt: Option<String>,
    raw: String,
}

impl OdimSource {
    pub fn parse(source: &str) -> Self {
        let mut parsed = Self {
            raw: source.to_string(),
            ..Self::default()
        };
        for item in source.split(',') {
            let Some((key, value)) = item.split_once(':') else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            let slot = match key.trim() {
                "WMO" => &mut parsed.wmo,
                "RAD" => &mut parsed.rad,
                "NOD" => &mut parsed.nod,
                "PLC" => &mut parsed.plc,
                "ORG" => &mut parsed.org,
                "CMT" => &mut parsed.cmt,
                _ => continue,
            };
            *slot = Some(value.to_string());
        }
        // "00000" is the ODIM placeholder for radars without a WMO number
        if parsed.wmo.as_deref() == Some("00000") {
            parsed.wmo = None;
        }
        parsed
    }

    /// Short node identifier of the radar
    pub fn node(&self) -> String {
        self.nod
            .clone()
            .or_else(|| self.rad.clone())
            .or_else(|| self.wmo.clone())
            .or_else(|| self.plc.clone())
            .unwrap_or_else(|| self.raw.clone())
    }

    /// Identifier used for radar-index encoding
    pub fn canonical_id(&self) -> String {
        if let Some(wmo) = &self.wmo {
            format!("WMO:{}", wmo)
        } else if let Some(rad) = &self.rad {
            format!("RAD:{}", rad)
        } else if let Some(nod) = &self.nod {
            format!("NOD:{}", nod)
        } else {
            self.raw.clone()
        }
    }
}

/// Strip any `CMT:` item from a source string
pub fn remove_cmt(source: &str) -> String {
    let stripped = CMT_PATTERN.replace_all(source, "");
    stripped
        .split(',')
        .filter(|item| !item.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}
