//! Sweep template - parameter schema and simulator input generation
//!
//! A template is a simulator input file in which some numeric settings are
//! replaced by `EXPLORE-PARAMETER <name> <REAL|INTEGER> <min> <max>`
//! declarations and `${name}` placeholders. Realizing a template rewrites
//! each declaration to `BIND-PARAMETER <name> <value>` and substitutes the
//! placeholders, producing the text the simulator actually consumes.
//! `extract_configuration` reads those `BIND-PARAMETER` lines back out of a
//! realized configuration in schema order.

use std::fmt::Write as _;
use std::path::Path;

use rand::Rng;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Value domain of a sweep parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterKind {
    /// Uniform draw from `[min, max)`.
    Real,
    /// Uniform integer draw from `min..=max`.
    Integer,
}

/// A single explorable parameter declared by a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    name: String,
    kind: ParameterKind,
    min: f64,
    max: f64,
}

impl Parameter {
    /// Create a parameter with an explicit range.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ParameterKind, min: f64, max: f64) -> Self {
        Self {
            name: name.into(),
            kind,
            min,
            max,
        }
    }

    /// Get the parameter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the value domain.
    #[must_use]
    pub const fn kind(&self) -> ParameterKind {
        self.kind
    }

    /// Get the lower bound.
    #[must_use]
    pub const fn min(&self) -> f64 {
        self.min
    }

    /// Get the upper bound.
    #[must_use]
    pub const fn max(&self) -> f64 {
        self.max
    }

    /// Draw a value from the parameter's range.
    ///
    /// The generator is an explicit argument so sweeps can be reproduced
    /// from a recorded seed.
    #[allow(clippy::cast_possible_truncation)]
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self.kind {
            ParameterKind::Real => self.min + rng.gen::<f64>() * (self.max - self.min),
            #[allow(clippy::cast_precision_loss)]
            ParameterKind::Integer => rng.gen_range(self.min as i64..=self.max as i64) as f64,
        }
    }

    /// Draw a value and render it the way it appears in a realized
    /// configuration. Integer parameters render without a fractional part.
    #[allow(clippy::cast_possible_truncation)]
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        let value = self.sample(rng);
        match self.kind {
            ParameterKind::Real => value.to_string(),
            ParameterKind::Integer => (value as i64).to_string(),
        }
    }
}

/// A parsed, immutable sweep template.
#[derive(Debug, Clone)]
pub struct SweepTemplate {
    run_id: String,
    body: String,
    parameters: Vec<Parameter>,
    name_to_index: FxHashMap<String, usize>,
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_valid_run_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Collect `${name}` references in one line. Unterminated `${` is treated as
/// plain text, matching a lazy-brace scan.
fn placeholder_names(line: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = line;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                names.push(&after[..end]);
                rest = &after[end + 1..];
            }
            None => break,
        }
    }
    names
}

impl SweepTemplate {
    /// Parse a template body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedTemplate`] for an unparseable
    /// `EXPLORE-PARAMETER` line, a duplicate parameter name, or a `${...}`
    /// placeholder that references no declared parameter. Returns
    /// [`Error::Dataset`] for an invalid run id.
    pub fn parse(run_id: impl Into<String>, body: impl Into<String>) -> Result<Self> {
        let run_id = run_id.into();
        if !is_valid_run_id(&run_id) {
            return Err(Error::Dataset(format!("invalid run id '{run_id}'")));
        }
        let body = body.into();

        let mut parameters: Vec<Parameter> = Vec::new();
        let mut name_to_index = FxHashMap::default();

        for (line_no, line) in body.lines().enumerate() {
            if !line.contains("EXPLORE-PARAMETER") {
                continue;
            }
            let malformed = |message: String| Error::MalformedTemplate {
                line: line_no,
                message,
            };
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.first() != Some(&"EXPLORE-PARAMETER") || tokens.len() != 5 {
                return Err(malformed(format!(
                    "expected 'EXPLORE-PARAMETER <name> <REAL|INTEGER> <min> <max>', got '{}'",
                    line.trim()
                )));
            }
            let name = tokens[1];
            if !is_valid_name(name) {
                return Err(malformed(format!("invalid parameter name '{name}'")));
            }
            let kind = match tokens[2] {
                "REAL" => ParameterKind::Real,
                "INTEGER" => ParameterKind::Integer,
                other => {
                    return Err(malformed(format!("unknown parameter kind '{other}'")));
                }
            };
            let min: f64 = tokens[3]
                .parse()
                .map_err(|_| malformed(format!("invalid minimum '{}'", tokens[3])))?;
            let max: f64 = tokens[4]
                .parse()
                .map_err(|_| malformed(format!("invalid maximum '{}'", tokens[4])))?;
            if name_to_index
                .insert(name.to_string(), parameters.len())
                .is_some()
            {
                return Err(malformed(format!("duplicate parameter '{name}'")));
            }
            parameters.push(Parameter::new(name, kind, min, max));
        }

        // Every placeholder must refer to a declared parameter.
        for (line_no, line) in body.lines().enumerate() {
            if !line.contains('$') {
                continue;
            }
            let names = placeholder_names(line);
            if names.is_empty() {
                return Err(Error::MalformedTemplate {
                    line: line_no,
                    message: format!("line contains '$' but no '${{name}}' reference: '{line}'"),
                });
            }
            for name in names {
                if !name_to_index.contains_key(name) {
                    return Err(Error::MalformedTemplate {
                        line: line_no,
                        message: format!("placeholder '${{{name}}}' has no matching parameter"),
                    });
                }
            }
        }

        Ok(Self {
            run_id,
            body,
            parameters,
            name_to_index,
        })
    }

    /// Load a template from a file named `<run_id>.template`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Dataset`] if the filename does not carry a valid run
    /// id, [`Error::Io`] if the file cannot be read, or any [`Self::parse`]
    /// error.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::Dataset(format!("invalid template path '{}'", path.display())))?;
        let run_id = file_name.strip_suffix(".template").ok_or_else(|| {
            Error::Dataset(format!(
                "template filename '{file_name}' is not of the form <run_id>.template"
            ))
        })?;
        let body = std::fs::read_to_string(path)?;
        Self::parse(run_id, body)
    }

    /// Get the run id.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the raw template body.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Get the declared parameters in template order.
    #[must_use]
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Look up a parameter by name.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.name_to_index.get(name).map(|&i| &self.parameters[i])
    }

    /// Parameter names in template order.
    #[must_use]
    pub fn parameter_names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }

    /// Draw one value per parameter from an explicit generator.
    ///
    /// Parameters are drawn in name-sorted order so that a given seed
    /// produces the same binding regardless of template line order.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<(String, String)> {
        let mut order: Vec<&Parameter> = self.parameters.iter().collect();
        order.sort_by(|a, b| a.name.cmp(&b.name));
        order
            .into_iter()
            .map(|p| (p.name.clone(), p.draw(rng)))
            .collect()
    }

    /// Realize the template with the given bindings.
    ///
    /// Each `EXPLORE-PARAMETER` line becomes `BIND-PARAMETER <name> <value>`
    /// (leading whitespace preserved) and every `${name}` placeholder is
    /// replaced by its bound value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingBinding`] if any declared parameter has no
    /// entry in `bindings`.
    pub fn substitute(&self, bindings: &[(String, String)]) -> Result<String> {
        let value_of = |name: &str| -> Result<&str> {
            bindings
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.as_str())
                .ok_or_else(|| Error::MissingBinding(name.to_string()))
        };
        for p in &self.parameters {
            value_of(&p.name)?;
        }

        let mut out = String::with_capacity(self.body.len());
        for (i, line) in self.body.split('\n').enumerate() {
            if i > 0 {
                out.push('\n');
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.first() == Some(&"EXPLORE-PARAMETER") && tokens.len() == 5 {
                let name = tokens[1];
                let indent = &line[..line.len() - line.trim_start().len()];
                // Declared parameters were validated in parse(), so the
                // binding lookup cannot fail here.
                let value = value_of(name)?;
                let _ = write!(out, "{indent}BIND-PARAMETER {name} {value}");
            } else {
                out.push_str(line);
            }
        }

        for p in &self.parameters {
            let value = value_of(&p.name)?;
            out = out.replace(&format!("${{{}}}", p.name), value);
        }
        Ok(out)
    }
}

/// Extract the bound parameter values from a realized configuration.
///
/// For each parameter in schema order, finds a `BIND-PARAMETER <name> <token>`
/// line and parses the token as an `f64`. The output order is the schema's
/// parameter order, not the order bindings appear in the text.
///
/// # Errors
///
/// Returns [`Error::ParameterNotBound`] when no binding exists for a
/// parameter, [`Error::InvalidBinding`] when the bound token is not a number.
pub fn extract_configuration(text: &str, parameters: &[Parameter]) -> Result<Vec<f64>> {
    let mut configuration = Vec::with_capacity(parameters.len());
    for param in parameters {
        let token = text
            .lines()
            .find_map(|line| {
                let mut tokens = line.split_whitespace();
                while let Some(tok) = tokens.next() {
                    if tok == "BIND-PARAMETER" {
                        return match (tokens.next(), tokens.next()) {
                            (Some(name), Some(value)) if name == param.name() => Some(value),
                            _ => None,
                        };
                    }
                }
                None
            })
            .ok_or_else(|| Error::ParameterNotBound(param.name().to_string()))?;
        let value: f64 = token.parse().map_err(|_| Error::InvalidBinding {
            name: param.name().to_string(),
            token: token.to_string(),
        })?;
        configuration.push(value);
    }
    Ok(configuration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const BODY: &str = "title example\n\
        EXPLORE-PARAMETER Temp REAL 0.5 2.0\n\
        EXPLORE-PARAMETER Steps INTEGER 100 1000\n\
        set temperature ${Temp}\n\
        set steps ${Steps}\n";

    #[test]
    fn test_parse_declarations_in_order() {
        let template = SweepTemplate::parse("run-a", BODY).unwrap();
        assert_eq!(template.run_id(), "run-a");
        let names = template.parameter_names();
        assert_eq!(names, vec!["Temp".to_string(), "Steps".to_string()]);
        assert_eq!(template.parameter("Temp").unwrap().kind(), ParameterKind::Real);
        assert_eq!(
            template.parameter("Steps").unwrap().kind(),
            ParameterKind::Integer
        );
    }

    #[test]
    fn test_parse_rejects_duplicate_parameter() {
        let body = "EXPLORE-PARAMETER x REAL 0 1\nEXPLORE-PARAMETER x REAL 0 1\n";
        let err = SweepTemplate::parse("run-a", body).unwrap_err();
        assert!(matches!(err, Error::MalformedTemplate { line: 1, .. }));
    }

    #[test]
    fn test_parse_rejects_unknown_placeholder() {
        let body = "EXPLORE-PARAMETER x REAL 0 1\nvalue ${y}\n";
        let err = SweepTemplate::parse("run-a", body).unwrap_err();
        assert!(matches!(err, Error::MalformedTemplate { line: 1, .. }));
    }

    #[test]
    fn test_parse_rejects_bare_dollar_line() {
        let body = "EXPLORE-PARAMETER x REAL 0 1\ncost $100\n";
        assert!(SweepTemplate::parse("run-a", body).is_err());
    }

    #[test]
    fn test_parse_rejects_bad_kind() {
        let body = "EXPLORE-PARAMETER x FLOAT 0 1\n";
        assert!(SweepTemplate::parse("run-a", body).is_err());
    }

    #[test]
    fn test_sample_within_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let real = Parameter::new("a", ParameterKind::Real, 0.5, 2.0);
        let integer = Parameter::new("b", ParameterKind::Integer, 3.0, 9.0);
        for _ in 0..100 {
            let v = real.sample(&mut rng);
            assert!((0.5..2.0).contains(&v));
            let w = integer.sample(&mut rng);
            assert!((3.0..=9.0).contains(&w));
            assert_eq!(w, w.trunc());
        }
    }

    #[test]
    fn test_draw_is_seed_reproducible() {
        let template = SweepTemplate::parse("run-a", BODY).unwrap();
        let a = template.draw(&mut StdRng::seed_from_u64(42));
        let b = template.draw(&mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_substitute_rewrites_declarations_and_placeholders() {
        let template = SweepTemplate::parse("run-a", BODY).unwrap();
        let bindings = vec![
            ("Temp".to_string(), "1.25".to_string()),
            ("Steps".to_string(), "500".to_string()),
        ];
        let realized = template.substitute(&bindings).unwrap();
        assert!(realized.contains("BIND-PARAMETER Temp 1.25"));
        assert!(realized.contains("BIND-PARAMETER Steps 500"));
        assert!(realized.contains("set temperature 1.25"));
        assert!(realized.contains("set steps 500"));
        assert!(!realized.contains("EXPLORE-PARAMETER"));
        assert!(!realized.contains("${"));
    }

    #[test]
    fn test_substitute_missing_binding() {
        let template = SweepTemplate::parse("run-a", BODY).unwrap();
        let bindings = vec![("Temp".to_string(), "1.25".to_string())];
        let err = template.substitute(&bindings).unwrap_err();
        assert!(matches!(err, Error::MissingBinding(name) if name == "Steps"));
    }

    #[test]
    fn test_extract_configuration_in_schema_order() {
        let template = SweepTemplate::parse("run-a", BODY).unwrap();
        // Bindings appear in the text in reverse schema order.
        let text = "BIND-PARAMETER Steps 500\nBIND-PARAMETER Temp 1.25\n";
        let config = extract_configuration(text, template.parameters()).unwrap();
        assert_eq!(config, vec![1.25, 500.0]);
    }

    #[test]
    fn test_extract_configuration_missing_parameter() {
        let template = SweepTemplate::parse("run-a", BODY).unwrap();
        let err = extract_configuration("BIND-PARAMETER Temp 1.0\n", template.parameters())
            .unwrap_err();
        assert!(matches!(err, Error::ParameterNotBound(name) if name == "Steps"));
    }

    #[test]
    fn test_extract_configuration_bad_token() {
        let template = SweepTemplate::parse("run-a", BODY).unwrap();
        let text = "BIND-PARAMETER Temp hot\nBIND-PARAMETER Steps 500\n";
        let err = extract_configuration(text, template.parameters()).unwrap_err();
        assert!(matches!(err, Error::InvalidBinding { name, .. } if name == "Temp"));
    }

    #[test]
    fn test_roundtrip_substitute_then_extract() {
        let template = SweepTemplate::parse("run-a", BODY).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let bindings = template.draw(&mut rng);
        let realized = template.substitute(&bindings).unwrap();
        let config = extract_configuration(&realized, template.parameters()).unwrap();
        assert_eq!(config.len(), 2);
        assert!((0.5..2.0).contains(&config[0]));
        assert!((100.0..=1000.0).contains(&config[1]));
    }
}
