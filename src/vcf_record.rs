//! A VCF data line which keeps every column verbatim except FILTER and edited INFO keys
//!

use simple_error::{SimpleResult, bail};
use strum::{AsRefStr, Display};

use crate::snpeff_effect::{Effect, parse_effects};

const CHROM: usize = 0;
const POS: usize = 1;
const ID: usize = 2;
const REF: usize = 3;
const ALT: usize = 4;
const QUAL: usize = 5;
const FILTER: usize = 6;
const INFO: usize = 7;

pub const PASS: &str = "PASS";

#[derive(AsRefStr, Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum VariantClass {
    Novel,
    #[strum(serialize = "dbSNP")]
    DbSnp,
    #[strum(serialize = "COSMIC")]
    Cosmic,
    #[strum(serialize = "ClnSNP")]
    ClnSnp,

    /// Deleterious variant present in dbSNP
    #[strum(serialize = "dbSNP_del")]
    DbSnpDel,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ClinicalSignificance {
    Absent,
    Pathogenic,
    NonPathogenic,
}

#[derive(Clone, Debug)]
pub struct VcfRecord {
    fields: Vec<String>,
    info: Vec<(String, Option<String>)>,
    info_modified: bool,

    /// 1-based line number in the source file
    line_number: usize,
}

impl VcfRecord {
    pub fn parse(line: &str, line_number: usize) -> SimpleResult<Self> {
        let fields = line
            .trim_end_matches(['\n', '\r'])
            .split('\t')
            .map(|x| x.to_string())
            .collect::<Vec<_>>();
        if fields.len() <= INFO {
            bail!(
                "VCF line {line_number} has {} columns, at least 8 expected",
                fields.len()
            );
        }
        let info = if fields[INFO] == "." || fields[INFO].is_empty() {
            Vec::new()
        } else {
            fields[INFO]
                .split(';')
                .filter(|x| !x.is_empty())
                .map(|x| match x.split_once('=') {
                    Some((k, v)) => (k.to_string(), Some(v.to_string())),
                    None => (x.to_string(), None),
                })
                .collect()
        };
        Ok(Self {
            fields,
            info,
            info_modified: false,
            line_number,
        })
    }

    pub fn chrom(&self) -> &str {
        &self.fields[CHROM]
    }

    pub fn pos(&self) -> &str {
        &self.fields[POS]
    }

    pub fn id(&self) -> &str {
        &self.fields[ID]
    }

    /// Location description for error messages
    pub fn location(&self) -> String {
        format!("line {} ({}:{})", self.line_number, self.chrom(), self.pos())
    }

    pub fn var_id(&self) -> String {
        [
            self.chrom(),
            self.pos(),
            self.fields[REF].as_str(),
            self.fields[ALT].as_str(),
        ]
        .join(":")
    }

    pub fn qual(&self) -> SimpleResult<Option<f64>> {
        let qual = &self.fields[QUAL];
        if qual == "." {
            return Ok(None);
        }
        match qual.parse::<f64>() {
            Ok(x) => Ok(Some(x)),
            Err(_) => bail!("Invalid QUAL value '{qual}' at {}", self.location()),
        }
    }

    pub fn filter(&self) -> &str {
        &self.fields[FILTER]
    }

    pub fn set_pass(&mut self) {
        self.fields[FILTER] = PASS.to_string();
    }

    pub fn is_rejected(&self) -> bool {
        let filter = self.filter();
        !(filter.is_empty() || filter == "." || filter == PASS)
    }

    /// Add a rejection tag, replacing any PASS marker
    pub fn add_filter(&mut self, tag: &str) {
        if !self.is_rejected() {
            self.fields[FILTER] = tag.to_string();
        } else if !self.filter().split(';').any(|x| x == tag) {
            self.fields[FILTER].push(';');
            self.fields[FILTER].push_str(tag);
        }
    }

    /// Value of an INFO key, flags have the empty string as value
    pub fn info_value(&self, key: &str) -> Option<&str> {
        self.info
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_deref().unwrap_or(""))
    }

    /// First numeric value of an INFO key, None if the key is absent or missing ('.')
    pub fn info_f64(&self, key: &str) -> SimpleResult<Option<f64>> {
        let Some(value) = self.info_value(key) else {
            return Ok(None);
        };
        let first = value.split(',').next().unwrap_or("");
        if first == "." || first.is_empty() {
            return Ok(None);
        }
        match first.parse::<f64>() {
            Ok(x) => Ok(Some(x)),
            Err(_) => bail!("Invalid {key} value '{value}' at {}", self.location()),
        }
    }

    /// Set an INFO key, appending it if not already present
    pub fn set_info(&mut self, key: &str, value: &str) {
        match self.info.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = Some(value.to_string()),
            None => self.info.push((key.to_string(), Some(value.to_string()))),
        }
        self.info_modified = true;
    }

    pub fn sample(&self) -> Option<&str> {
        self.info_value("SAMPLE").filter(|x| !x.is_empty())
    }

    pub fn clinical_significance(&self) -> ClinicalSignificance {
        let Some(value) = self.info_value("CLNSIG").filter(|x| !x.is_empty() && *x != ".") else {
            return ClinicalSignificance::Absent;
        };
        let pathogenic = value
            .split([',', '|'])
            .filter_map(|x| x.trim().parse::<i32>().ok())
            .any(|x| (4..=6).contains(&x) || x == 255);
        if pathogenic {
            ClinicalSignificance::Pathogenic
        } else {
            ClinicalSignificance::NonPathogenic
        }
    }

    /// Classification from the variant ID and clinical significance
    pub fn classification(&self) -> VariantClass {
        let id = self.id();
        if id.contains("COSM") {
            VariantClass::Cosmic
        } else if id.starts_with("rs") {
            if self.clinical_significance() == ClinicalSignificance::Pathogenic {
                VariantClass::ClnSnp
            } else {
                VariantClass::DbSnp
            }
        } else {
            VariantClass::Novel
        }
    }

    /// Parsed snpEff effects, None if there is no EFF annotation
    pub fn effects(&self) -> SimpleResult<Option<Vec<Effect>>> {
        let Some(value) = self.info_value("EFF") else {
            return Ok(None);
        };
        match parse_effects(value) {
            Ok(x) => Ok(Some(x)),
            Err(e) => bail!("{e} at {}", self.location()),
        }
    }

    pub fn to_line(&self) -> String {
        if !self.info_modified {
            return self.fields.join("\t");
        }
        let info = if self.info.is_empty() {
            ".".to_string()
        } else {
            self.info
                .iter()
                .map(|(k, v)| match v {
                    Some(v) => format!("{k}={v}"),
                    None => k.clone(),
                })
                .collect::<Vec<_>>()
                .join(";")
        };
        let mut fields = self.fields.iter().map(|x| x.as_str()).collect::<Vec<_>>();
        fields[INFO] = info.as_str();
        fields.join("\t")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE: &str = "chr1\t100\trs123\tA\tG\t50\tLowQual\tDP=20;AF=0.25,0.1;SOMATIC;CLNSIG=2|5\tGT\t0/1";

    #[test]
    fn test_parse_and_write_verbatim() {
        let record = VcfRecord::parse(LINE, 12).unwrap();
        assert_eq!(record.var_id(), "chr1:100:A:G");
        assert_eq!(record.qual().unwrap(), Some(50.0));
        assert_eq!(record.info_f64("AF").unwrap(), Some(0.25));
        assert_eq!(record.info_f64("MQ").unwrap(), None);
        assert_eq!(record.info_value("SOMATIC"), Some(""));
        assert!(record.is_rejected());
        assert_eq!(record.to_line(), LINE);
        assert_eq!(record.location(), "line 12 (chr1:100)");
    }

    #[test]
    fn test_filter_tags() {
        let mut record = VcfRecord::parse(LINE, 1).unwrap();
        record.set_pass();
        assert!(!record.is_rejected());
        record.add_filter("MULTI");
        assert_eq!(record.filter(), "MULTI");
        record.add_filter("DUP");
        record.add_filter("MULTI");
        assert_eq!(record.filter(), "MULTI;DUP");
    }

    #[test]
    fn test_classification() {
        let record = VcfRecord::parse(LINE, 1).unwrap();
        assert_eq!(record.clinical_significance(), ClinicalSignificance::Pathogenic);
        assert_eq!(record.classification(), VariantClass::ClnSnp);

        let line = "chr1\t100\trs1;COSM5\tA\tG\t.\t.\tCLNSIG=2";
        let record = VcfRecord::parse(line, 1).unwrap();
        assert_eq!(record.classification(), VariantClass::Cosmic);
        assert_eq!(record.clinical_significance(), ClinicalSignificance::NonPathogenic);
        assert_eq!(record.qual().unwrap(), None);

        let line = "chr1\t100\trs1\tA\tG\t.\t.\t.";
        let record = VcfRecord::parse(line, 1).unwrap();
        assert_eq!(record.classification(), VariantClass::DbSnp);
        assert_eq!(record.clinical_significance(), ClinicalSignificance::Absent);

        let line = "chr1\t100\t.\tA\tG\t.\t.\t.";
        assert_eq!(
            VcfRecord::parse(line, 1).unwrap().classification(),
            VariantClass::Novel
        );
        assert_eq!(VariantClass::DbSnpDel.to_string(), "dbSNP_del");
    }

    #[test]
    fn test_set_info() {
        let line = "chr1\t100\t.\tA\tG\t.\t.\t.";
        let mut record = VcfRecord::parse(line, 1).unwrap();
        assert_eq!(record.sample(), None);
        record.set_info("SAMPLE", "s1");
        assert_eq!(record.sample(), Some("s1"));
        assert_eq!(record.to_line(), "chr1\t100\t.\tA\tG\t.\t.\tSAMPLE=s1");
    }

    #[test]
    fn test_short_line_is_error() {
        assert!(VcfRecord::parse("chr1\t100\t.", 3).is_err());
    }
}
