//! Parsing of snpEff `EFF` INFO annotations
//!

use lazy_static::lazy_static;
use regex::Regex;
use simple_error::{SimpleResult, bail};
use unwrap::unwrap;

lazy_static! {
    static ref AA_POSITION_REGEX: Regex =
        unwrap!(Regex::new(r"\d+"), "Invalid amino acid position regex");
}

/// One entry of an `EFF` annotation, `TYPE(IMPACT|CLASS|CODON|AA|AA_LEN|GENE|...)`
#[derive(Clone, Debug, PartialEq)]
pub struct Effect {
    pub effect_type: String,
    pub impact: String,
    pub functional_class: String,
    pub codon_change: String,
    pub aa_change: String,
    pub aa_length: Option<u32>,
    pub gene: String,
}

impl Effect {
    pub fn parse(entry: &str) -> SimpleResult<Self> {
        let Some((effect_type, rest)) = entry.split_once('(') else {
            bail!("Can't parse snpEff effect: '{entry}'");
        };
        let Some(fields) = rest.strip_suffix(')') else {
            bail!("Can't parse snpEff effect: '{entry}'");
        };
        let fields = fields.split('|').collect::<Vec<_>>();
        let field = |i: usize| fields.get(i).copied().unwrap_or("").to_string();
        Ok(Self {
            effect_type: effect_type.to_string(),
            impact: field(0),
            functional_class: field(1),
            codon_change: field(2),
            aa_change: field(3),
            aa_length: fields.get(4).and_then(|x| x.parse().ok()),
            gene: field(5),
        })
    }

    /// Position of the change in the protein, the first number in the amino acid change
    pub fn aa_position(&self) -> Option<u32> {
        AA_POSITION_REGEX.find(&self.aa_change)?.as_str().parse().ok()
    }

    /// Fraction of the protein preceding the change
    pub fn relative_protein_position(&self) -> Option<f64> {
        let length = self.aa_length.filter(|x| *x > 0)?;
        Some(self.aa_position()? as f64 / length as f64)
    }

    pub fn is_truncating(&self) -> bool {
        let t = self.effect_type.to_uppercase();
        t == "STOP_GAINED" || t == "FRAME_SHIFT"
    }
}

/// Parse all comma-separated entries of an `EFF` value
pub fn parse_effects(value: &str) -> SimpleResult<Vec<Effect>> {
    let mut effects = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in value.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                effects.push(Effect::parse(&value[start..i])?);
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < value.len() {
        effects.push(Effect::parse(&value[start..])?);
    }
    Ok(effects)
}
