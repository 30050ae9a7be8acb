use anyhow::{bail, Context, Result};

pub const DEFAULT_ROWS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable report per scenario
    Text,
    /// One JSON object per scenario
    Json,
}

/// Run settings taken from the command line
///
/// Usage: `eager-loading-demo [ROWS] [json|text]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoConfig {
    /// Number of seeded Person → Company chains
    pub rows: usize,
    pub format: OutputFormat,
}

impl Default for DemoConfig {
    fn default() -> Self {
        DemoConfig {
            rows: DEFAULT_ROWS,
            format: OutputFormat::Text,
        }
    }
}

impl DemoConfig {
    /// Parse arguments (program name already skipped)
    pub fn from_args<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = DemoConfig::default();
        let mut rows_seen = false;

        for arg in args {
            match arg.as_str() {
                "json" => config.format = OutputFormat::Json,
                "text" => config.format = OutputFormat::Text,
                _ => {
                    if rows_seen {
                        bail!("Unexpected argument: {}", arg);
                    }
                    config.rows = arg
                        .parse()
                        .with_context(|| format!("Invalid row count: {}", arg))?;
                    rows_seen = true;
                }
            }
        }

        Ok(config)
    }
}
