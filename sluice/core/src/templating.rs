use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use sluice_schemas::Pipeline;
use tracing::debug;

use crate::stages::validate_table_name;

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("pipeline file not found: '{file_path}'")]
    NotFound {
        #[source]
        source: std::io::Error,
        file_path: String,
    },

    #[error(
        "unsupported configuration format '{0}', this build supports: {formats}",
        formats = TemplateError::available_formats()
    )]
    UnknownFormat(TemplateFormat),

    #[error("missing template parameters: {0:?}, provide them with -p name=value")]
    MissingParams(BTreeSet<String>),

    #[cfg(feature = "json")]
    #[error("JSON parsing error at line {}, column {}: {error}", error.line(), error.column())]
    ParseJson {
        #[source]
        error: serde_json::Error,
    },

    #[cfg(feature = "yaml")]
    #[error("YAML parsing error: {error}")]
    ParseYaml {
        #[source]
        error: serde_yml::Error,
    },

    #[cfg(feature = "toml")]
    #[error("TOML parsing error: {error}")]
    ParseToml {
        #[source]
        error: toml::de::Error,
    },

    #[error("invalid pipeline definition: {0}")]
    Invalid(String),
}

impl TemplateError {
    fn available_formats() -> String {
        let mut formats = vec![];

        #[cfg(feature = "json")]
        formats.push("json (.json)");

        #[cfg(feature = "yaml")]
        formats.push("yaml (.yaml, .yml)");

        #[cfg(feature = "toml")]
        formats.push("toml (.toml)");

        if formats.is_empty() {
            "none".to_string()
        } else {
            formats.join(", ")
        }
    }
}

/// Serialization format of a pipeline definition, usually taken from the file extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateFormat {
    Json,
    Toml,
    Yaml,
    Unknown(String),
}

impl std::fmt::Display for TemplateFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateFormat::Json => write!(f, "json"),
            TemplateFormat::Toml => write!(f, "toml"),
            TemplateFormat::Yaml => write!(f, "yaml"),
            TemplateFormat::Unknown(format) => write!(f, "{format}"),
        }
    }
}

pub fn format_from_path<P: AsRef<Path>>(path: P) -> TemplateFormat {
    let ext = path.as_ref().extension().and_then(|s| s.to_str());

    match ext {
        Some("toml") => TemplateFormat::Toml,
        Some("json") => TemplateFormat::Json,
        Some("yml") | Some("yaml") => TemplateFormat::Yaml,
        ext => TemplateFormat::Unknown(ext.unwrap_or("unknown_ext").to_string()),
    }
}

/// Loading of pipeline definitions with `${name}` parameter substitution.
///
/// Every `${name}` in the definition is replaced before parsing. A placeholder
/// without a matching parameter fails the load and all missing names are reported.
pub trait TemplateLoader: Sized {
    /// Load a definition from a file, the format follows the file extension
    fn from_file<P: AsRef<Path>>(
        path: P,
        params: HashMap<String, String>,
    ) -> Result<Self, TemplateError>;

    fn from_str<T: AsRef<str>>(
        value: T,
        format: TemplateFormat,
        params: HashMap<String, String>,
    ) -> Result<Self, TemplateError>;

    fn substitute_params(
        raw: &str,
        params: HashMap<String, String>,
    ) -> Result<String, TemplateError> {
        static PARAM_REGEX: OnceLock<Regex> = OnceLock::new();
        let mut definition = raw.to_string();

        params.into_iter().for_each(|(name, value)| {
            let template = format!("${{{name}}}");
            definition = definition.replace(template.as_str(), value.as_str());
        });

        let missing_params = PARAM_REGEX
            .get_or_init(|| Regex::new("\\$\\{([a-zA-Z0-9_]+)\\}").expect("invalid regex"))
            .captures_iter(definition.as_str())
            .filter_map(|capture| capture.get(1).map(|m| m.as_str().to_string()))
            .collect::<BTreeSet<String>>();

        if !missing_params.is_empty() {
            return Err(TemplateError::MissingParams(missing_params));
        }

        Ok(definition)
    }
}

/// Reject definitions that parse but cannot run
pub fn validate_pipeline(pipeline: &Pipeline) -> Result<(), TemplateError> {
    let tables = &pipeline.tables;
    for name in [&tables.sales, &tables.aggregate, &tables.mirror] {
        validate_table_name(name).map_err(|err| TemplateError::Invalid(err.to_string()))?;
    }

    if tables.sales == tables.aggregate {
        return Err(TemplateError::Invalid(format!(
            "sales and aggregate tables must differ, both are '{}'",
            tables.sales
        )));
    }

    if pipeline.replication.chunk_rows == 0 {
        return Err(TemplateError::Invalid(
            "replication.chunk_rows must be at least 1".into(),
        ));
    }

    if !pipeline.input.delimiter.is_ascii() {
        return Err(TemplateError::Invalid(format!(
            "delimiter '{}' must be a single byte character",
            pipeline.input.delimiter
        )));
    }

    Ok(())
}

impl TemplateLoader for Pipeline {
    fn from_file<P: AsRef<Path>>(
        path: P,
        params: HashMap<String, String>,
    ) -> Result<Self, TemplateError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| TemplateError::NotFound {
            source: e,
            file_path: path.display().to_string(),
        })?;

        Self::from_str(contents, format_from_path(path), params)
    }

    fn from_str<T: AsRef<str>>(
        value: T,
        format: TemplateFormat,
        params: HashMap<String, String>,
    ) -> Result<Self, TemplateError> {
        debug!("Parsing pipeline definition with format: {format}");

        let definition = Self::substitute_params(value.as_ref(), params)?;
        let definition = definition.as_str();

        let pipeline = match format {
            TemplateFormat::Json => {
                #[cfg(feature = "json")]
                {
                    serde_json::from_str::<Pipeline>(definition)
                        .map_err(|error| TemplateError::ParseJson { error })?
                }
                #[cfg(not(feature = "json"))]
                {
                    return Err(TemplateError::UnknownFormat(TemplateFormat::Json));
                }
            }
            TemplateFormat::Yaml => {
                #[cfg(feature = "yaml")]
                {
                    serde_yml::from_str::<Pipeline>(definition)
                        .map_err(|error| TemplateError::ParseYaml { error })?
                }
                #[cfg(not(feature = "yaml"))]
                {
                    return Err(TemplateError::UnknownFormat(TemplateFormat::Yaml));
                }
            }
            TemplateFormat::Toml => {
                #[cfg(feature = "toml")]
                {
                    toml::from_str::<Pipeline>(definition)
                        .map_err(|error| TemplateError::ParseToml { error })?
                }
                #[cfg(not(feature = "toml"))]
                {
                    return Err(TemplateError::UnknownFormat(TemplateFormat::Toml));
                }
            }
            fmt @ TemplateFormat::Unknown(_) => return Err(TemplateError::UnknownFormat(fmt)),
        };

        validate_pipeline(&pipeline)?;

        Ok(pipeline)
    }
}
