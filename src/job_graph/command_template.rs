use std::collections::BTreeMap;
use std::str::FromStr;

use simple_error::{SimpleResult, bail};
use strum::{AsRefStr, Display, EnumString};

/// Named values that can be substituted into a job command template
#[derive(AsRefStr, Clone, Copy, Debug, Display, EnumString, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[strum(serialize_all = "snake_case")]
pub enum JobParam {
    OutputDir,
    Threads,
    Sample,
    Caller,
    Vcf,
    Bam,
    Bed,
    BamCmdline,
    NormalMatchCmdline,
    QualimapGff,
    Project,
    Path,
}

pub type JobParams = BTreeMap<JobParam, String>;

#[derive(Clone, Debug, PartialEq)]
enum Segment {
    Literal(String),
    Param(JobParam),
}

/// Command line with `{name}` placeholders, checked against [JobParam] when constructed
///
/// Literal braces are written `{{` and `}}`.
///
#[derive(Clone, Debug, PartialEq)]
pub struct CommandTemplate {
    segments: Vec<Segment>,
}

/// Escape braces so that `text` appears verbatim in a formatted template
pub fn escape_literal(text: &str) -> String {
    text.replace('{', "{{").replace('}', "}}")
}

impl CommandTemplate {
    pub fn parse(template: &str) -> SimpleResult<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(x) => name.push(x),
                            None => bail!("Unclosed placeholder in command template: {template}"),
                        }
                    }
                    let param = match JobParam::from_str(&name) {
                        Ok(x) => x,
                        Err(_) => {
                            bail!("Unknown parameter '{name}' in command template: {template}")
                        }
                    };
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Param(param));
                }
                '}' => bail!("Unmatched '}}' in command template: {template}"),
                x => literal.push(x),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self { segments })
    }

    /// Parameters referenced by this template, in order of first use
    pub fn params(&self) -> Vec<JobParam> {
        let mut params = Vec::new();
        for segment in self.segments.iter() {
            if let Segment::Param(x) = segment {
                if !params.contains(x) {
                    params.push(*x);
                }
            }
        }
        params
    }

    pub fn format(&self, values: &JobParams) -> SimpleResult<String> {
        let mut result = String::new();
        for segment in self.segments.iter() {
            match segment {
                Segment::Literal(x) => result.push_str(x),
                Segment::Param(x) => match values.get(x) {
                    Some(value) => result.push_str(value),
                    None => bail!("No value given for command parameter '{x}'"),
                },
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_template() {
        let template = CommandTemplate::parse("run --vcf '{vcf}' -o {output_dir} -s {sample} {{x}}").unwrap();
        assert_eq!(
            template.params(),
            vec![JobParam::Vcf, JobParam::OutputDir, JobParam::Sample]
        );

        let mut values = JobParams::new();
        values.insert(JobParam::Vcf, "a.vcf".to_string());
        values.insert(JobParam::OutputDir, "/out".to_string());
        values.insert(JobParam::Sample, "s1".to_string());
        assert_eq!(
            template.format(&values).unwrap(),
            "run --vcf 'a.vcf' -o /out -s s1 {x}"
        );

        values.remove(&JobParam::Sample);
        assert!(template.format(&values).is_err());
    }

    #[test]
    fn test_reject_bad_templates() {
        assert!(CommandTemplate::parse("run {no_such_param}").is_err());
        assert!(CommandTemplate::parse("run {vcf").is_err());
        assert!(CommandTemplate::parse("run vcf}").is_err());
    }

    #[test]
    fn test_escaped_literal_round_trip() {
        let path = "/data/{odd}/dir";
        let template = CommandTemplate::parse(&format!("ls {}", escape_literal(path))).unwrap();
        assert!(template.params().is_empty());
        assert_eq!(template.format(&JobParams::new()).unwrap(), "ls /data/{odd}/dir");
    }
}
