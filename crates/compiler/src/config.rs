//! Compiler options
//!
//! Embedders and the CLI tune a compile session through
//! [`CompilerOptions`], either programmatically with the builder methods
//! or from a TOML file (`tarnc ir --config tarnc.toml`).

use serde::Deserialize;

/// The generated top-level constructor name may not exceed this many
/// bytes.
pub const MAX_MAIN_NAME: usize = 30;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerOptions {
    /// Lower the chunk to IR after parsing. Disable to stop at the
    /// resolved syntax tree (parse-only checks).
    pub linearize: bool,
    /// Name given to the top-level closure constructor.
    pub main_func_name: String,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        CompilerOptions {
            linearize: true,
            main_func_name: "main".to_string(),
        }
    }
}

impl CompilerOptions {
    pub fn new() -> Self {
        CompilerOptions::default()
    }

    pub fn with_linearize(mut self, linearize: bool) -> Self {
        self.linearize = linearize;
        self
    }

    pub fn with_main_func_name(mut self, name: impl Into<String>) -> Self {
        self.main_func_name = name.into();
        self
    }

    /// Parse options from TOML text.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, String> {
        let options: CompilerOptions = toml::from_str(toml_str)
            .map_err(|e| format!("failed to parse compiler options: {}", e))?;
        options.validate()?;
        Ok(options)
    }

    /// Check constraints the compile entry points rely on.
    pub fn validate(&self) -> Result<(), String> {
        if self.main_func_name.is_empty() {
            return Err("main_func_name must not be empty".to_string());
        }
        if self.main_func_name.len() > MAX_MAIN_NAME {
            return Err(format!(
                "main_func_name exceeds {} bytes",
                MAX_MAIN_NAME
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = CompilerOptions::new();
        assert!(options.linearize);
        assert_eq!(options.main_func_name, "main");
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_from_toml() {
        let options =
            CompilerOptions::from_toml_str("linearize = false\nmain_func_name = \"init\"")
                .unwrap();
        assert!(!options.linearize);
        assert_eq!(options.main_func_name, "init");
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(CompilerOptions::from_toml_str("optimise = true").is_err());
    }

    #[test]
    fn test_long_main_name_rejected() {
        let options = CompilerOptions::new().with_main_func_name("x".repeat(31));
        assert!(options.validate().is_err());
    }
}
