//! Key generators turn one metadata record into a storage URI.
//!
//! Generators are registered by name in a [`KeyGeneratorRegistry`] at
//! startup and looked up by the name a source's configuration gives.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use hypothetic_common::{HypotheticError, HypotheticResult};

/// Field name -> rendered value, as handed to a key generator.
pub type KeyRecord = BTreeMap<String, String>;

/// Maps a metadata record to the URI of the object holding that partition.
///
/// Implementations must be deterministic and free of side effects.
pub trait KeyGenerator: Send + Sync {
    fn generate(&self, record: &KeyRecord) -> HypotheticResult<String>;
}

impl<F> KeyGenerator for F
where
    F: Fn(&KeyRecord) -> HypotheticResult<String> + Send + Sync,
{
    fn generate(&self, record: &KeyRecord) -> HypotheticResult<String> {
        self(record)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
}

/// Key generator driven by a `{field}` placeholder template, e.g.
/// `s3://bucket/{forecast_reference_time}/{forecast_period}.grib2`.
///
/// `{{` and `}}` produce literal braces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateKeyGenerator {
    template: String,
    segments: Vec<Segment>,
}

impl TemplateKeyGenerator {
    pub fn parse(template: &str) -> HypotheticResult<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();

        while let Some(ch) = chars.next() {
            match ch {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut field = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(c) => field.push(c),
                            None => {
                                return Err(HypotheticError::configuration(format!(
                                    "unclosed placeholder in key template '{}'",
                                    template
                                )))
                            }
                        }
                    }
                    let field = field.trim();
                    if field.is_empty() {
                        return Err(HypotheticError::configuration(format!(
                            "empty placeholder in key template '{}'",
                            template
                        )));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(field.to_string()));
                }
                '}' => {
                    return Err(HypotheticError::configuration(format!(
                        "unmatched '}}' in key template '{}'",
                        template
                    )))
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            template: template.to_string(),
            segments,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Field names referenced by the template, in order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Field(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }
}

impl KeyGenerator for TemplateKeyGenerator {
    fn generate(&self, record: &KeyRecord) -> HypotheticResult<String> {
        let mut out = String::with_capacity(self.template.len() + 32);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(name) => {
                    let value = record.get(name).ok_or_else(|| {
                        HypotheticError::configuration(format!(
                            "key template references unknown field '{}'",
                            name
                        ))
                    })?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

/// Named key generators available to sources.
#[derive(Default, Clone)]
pub struct KeyGeneratorRegistry {
    generators: HashMap<String, Arc<dyn KeyGenerator>>,
}

impl KeyGeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `generator` under `name`, replacing any earlier registration.
    pub fn register<G>(&mut self, name: impl Into<String>, generator: G)
    where
        G: KeyGenerator + 'static,
    {
        self.generators.insert(name.into(), Arc::new(generator));
    }

    pub fn resolve(&self, name: &str) -> HypotheticResult<Arc<dyn KeyGenerator>> {
        self.generators.get(name).cloned().ok_or_else(|| {
            let mut known: Vec<&str> = self.generators.keys().map(|k| k.as_str()).collect();
            known.sort_unstable();
            HypotheticError::configuration(format!(
                "unknown key generator '{}' (registered: {:?})",
                name, known
            ))
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.generators.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.generators.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for KeyGeneratorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyGeneratorRegistry")
            .field("generators", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> KeyRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_template_generator() {
        let generator = TemplateKeyGenerator::parse(
            "s3://mogreps/{forecast_reference_time}/{forecast_period}-{level}.grib2",
        )
        .unwrap();
        let uri = generator
            .generate(&record(&[
                ("forecast_reference_time", "2024-01-15T12:00:00Z"),
                ("forecast_period", "6"),
                ("level", "10"),
            ]))
            .unwrap();
        assert_eq!(uri, "s3://mogreps/2024-01-15T12:00:00Z/6-10.grib2");
        assert_eq!(
            generator.fields().collect::<Vec<_>>(),
            vec!["forecast_reference_time", "forecast_period", "level"]
        );
    }

    #[test]
    fn test_template_escaped_braces() {
        let generator = TemplateKeyGenerator::parse("a{{b}}/{x}").unwrap();
        assert_eq!(generator.generate(&record(&[("x", "1")])).unwrap(), "a{b}/1");
    }

    #[test]
    fn test_template_errors() {
        assert!(TemplateKeyGenerator::parse("s3://b/{unclosed").is_err());
        assert!(TemplateKeyGenerator::parse("s3://b/{}").is_err());
        assert!(TemplateKeyGenerator::parse("s3://b/x}").is_err());

        let generator = TemplateKeyGenerator::parse("{missing}").unwrap();
        let err = generator.generate(&record(&[])).unwrap_err();
        assert!(matches!(err, HypotheticError::Configuration(_)));
    }

    #[test]
    fn test_registry_resolves_closures() {
        let mut registry = KeyGeneratorRegistry::new();
        registry.register("by_period", |r: &KeyRecord| -> HypotheticResult<String> {
            Ok(format!("/data/{}.nc", r["forecast_period"]))
        });

        let generator = registry.resolve("by_period").unwrap();
        assert_eq!(
            generator.generate(&record(&[("forecast_period", "3")])).unwrap(),
            "/data/3.nc"
        );
        assert!(registry.contains("by_period"));
    }

    #[test]
    fn test_registry_unknown_name_is_configuration_error() {
        let registry = KeyGeneratorRegistry::new();
        assert!(matches!(
            registry.resolve("mymodule.keys.generate"),
            Err(HypotheticError::Configuration(_))
        ));
    }
}
