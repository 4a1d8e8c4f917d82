//! Schema of `.config/blueprint.styx`.
//!
//! ```styx
//! provider postgres
//! database_url "postgres://app@localhost/app"
//! blueprints "schema/tables.json"
//! max_risk LOW
//! ```

use facet::Facet;

/// Project configuration.
#[derive(Facet, Debug, Clone, Default, PartialEq)]
pub struct Config {
    /// Database flavor, only `postgres` is supported.
    #[facet(default)]
    pub provider: Option<String>,

    /// Connection URL, overridden by `DATABASE_URL`.
    #[facet(default)]
    pub database_url: Option<String>,

    /// JSON file holding the target table descriptors, relative to the
    /// project root.
    #[facet(default)]
    pub blueprints: Option<String>,

    /// Highest risk `apply` accepts without `--force`
    /// (`NONE`, `LOW`, `MEDIUM` or `HIGH`).
    #[facet(default)]
    pub max_risk: Option<String>,
}

impl Config {
    pub const DEFAULT_PROVIDER: &'static str = "postgres";
    pub const DEFAULT_BLUEPRINTS: &'static str = "blueprints.json";

    pub fn provider(&self) -> &str {
        self.provider.as_deref().unwrap_or(Self::DEFAULT_PROVIDER)
    }

    pub fn blueprints(&self) -> &str {
        self.blueprints
            .as_deref()
            .unwrap_or(Self::DEFAULT_BLUEPRINTS)
    }
}
