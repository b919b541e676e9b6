use crate::config::WorkerApplicationConfig;
use crate::handler::{EchoHandler, JsonProcessorHandler, SleepHandler};
use crate::worker::WorkerApplication;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LocatorError {
    #[error("Invalid application locator {0:?}, expected \"<module>:<attribute>\"")]
    Malformed(String),

    #[error("Application {locator} not found (available: {})", .available.join(", "))]
    NotFound {
        locator: String,
        available: Vec<String>,
    },
}

/// `<module>:<attribute>` reference to an application
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AppLocator {
    pub module: String,
    pub attribute: String,
}

impl FromStr for AppLocator {
    type Err = LocatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(module), Some(attribute), None)
                if !module.is_empty() && !attribute.is_empty() =>
            {
                Ok(AppLocator {
                    module: module.to_string(),
                    attribute: attribute.to_string(),
                })
            }
            _ => Err(LocatorError::Malformed(s.to_string())),
        }
    }
}

impl fmt::Display for AppLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.attribute)
    }
}

/// Builds an application from the process configuration
pub type AppFactory = fn(WorkerApplicationConfig) -> WorkerApplication;

/// Applications compiled into the binary, addressable by locator
#[derive(Default)]
pub struct AppCatalog {
    factories: HashMap<AppLocator, AppFactory>,
}

impl AppCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the bundled example application
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog.register(
            AppLocator {
                module: "examples".to_string(),
                attribute: "app".to_string(),
            },
            example_app,
        );
        catalog
    }

    pub fn register(&mut self, locator: AppLocator, factory: AppFactory) {
        self.factories.insert(locator, factory);
    }

    /// Every registered locator, sorted
    pub fn locators(&self) -> Vec<String> {
        let mut locators: Vec<String> =
            self.factories.keys().map(|l| l.to_string()).collect();
        locators.sort();
        locators
    }

    /// Parse `locator` and build the application it names
    pub fn resolve(
        &self,
        locator: &str,
        config: WorkerApplicationConfig,
    ) -> Result<WorkerApplication, LocatorError> {
        let parsed: AppLocator = locator.parse()?;
        let factory = self
            .factories
            .get(&parsed)
            .ok_or_else(|| LocatorError::NotFound {
                locator: parsed.to_string(),
                available: self.locators(),
            })?;
        Ok(factory(config))
    }
}

fn example_app(config: WorkerApplicationConfig) -> WorkerApplication {
    WorkerApplication::new(config)
        .task("echo", EchoHandler)
        .task("sleep", SleepHandler::new(1000))
        .task("json_processor", JsonProcessorHandler)
}
