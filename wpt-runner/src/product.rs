// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Products: named pairings of a browser with an executor factory.
//!
//! Products are looked up by name in a [`ProductRegistry`]. Every product is configured through the
//! same [`ProductArgs`] value, which is also how the configuration reaches worker processes.

use crate::{
    browser::{Browser, CommandBrowser, NullBrowser},
    errors::{ProductArgsError, ProductNotFound},
    reporter::events::ManagerId,
    worker::{CommandExecutorFactory, ExecutorFactory},
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, sync::Arc};
use wpt_metadata::TestType;

/// The default base URL tests are loaded from.
pub const DEFAULT_BASE_URL: &str = "http://web-platform.test:8000";

/// Arguments shared by every product.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProductArgs {
    /// The browser binary.
    #[serde(default)]
    pub binary: Option<String>,

    /// Extra arguments passed to the browser binary.
    #[serde(default)]
    pub binary_args: Vec<String>,

    /// The template turning a test preference into a browser argument, e.g.
    /// `--pref={name}={value}`.
    #[serde(default)]
    pub pref_arg: Option<String>,

    /// The command run once per test by the executor, with its arguments.
    #[serde(default)]
    pub executor_command: Vec<String>,

    /// The URL tests are loaded from.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Product-specific settings.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_owned()
}

impl Default for ProductArgs {
    fn default() -> Self {
        Self {
            binary: None,
            binary_args: Vec::new(),
            pref_arg: None,
            executor_command: Vec::new(),
            base_url: default_base_url(),
            extra: BTreeMap::new(),
        }
    }
}

/// A browser product.
pub trait BrowserProduct: Send + Sync + fmt::Debug {
    /// The name this product is registered under.
    fn name(&self) -> &str;

    /// The test types this product can run.
    fn supported_test_types(&self) -> &[TestType];

    /// Checks that `args` are usable, before any runner is started.
    fn check_args(&self, args: &ProductArgs) -> Result<(), ProductArgsError>;

    /// Creates the browser for one runner.
    fn browser(
        &self,
        args: &ProductArgs,
        manager: ManagerId,
    ) -> Result<Box<dyn Browser>, ProductArgsError>;

    /// Creates the factory workers use to build executors.
    fn executor_factory(
        &self,
        args: &ProductArgs,
    ) -> Result<Arc<dyn ExecutorFactory>, ProductArgsError>;
}

/// Runs a configured browser binary, and a command per test.
#[derive(Clone, Copy, Debug, Default)]
pub struct CommandProduct;

impl CommandProduct {
    /// The name of this product.
    pub const NAME: &'static str = "command";
}

impl BrowserProduct for CommandProduct {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn supported_test_types(&self) -> &[TestType] {
        &TestType::ALL
    }

    fn check_args(&self, args: &ProductArgs) -> Result<(), ProductArgsError> {
        if args.binary.is_none() {
            return Err(ProductArgsError::new(Self::NAME, "a browser binary is required"));
        }
        check_executor_command(Self::NAME, args)
    }

    fn browser(
        &self,
        args: &ProductArgs,
        _manager: ManagerId,
    ) -> Result<Box<dyn Browser>, ProductArgsError> {
        let binary = args
            .binary
            .as_deref()
            .ok_or_else(|| ProductArgsError::new(Self::NAME, "a browser binary is required"))?;
        let mut browser = CommandBrowser::new(binary, args.binary_args.clone());
        if let Some(template) = &args.pref_arg {
            browser.set_pref_arg(template.clone());
        }
        Ok(Box::new(browser))
    }

    fn executor_factory(
        &self,
        args: &ProductArgs,
    ) -> Result<Arc<dyn ExecutorFactory>, ProductArgsError> {
        command_executor_factory(Self::NAME, args)
    }
}

/// Runs a command per test, without a browser process managed by the harness.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExecutorOnlyProduct;

impl ExecutorOnlyProduct {
    /// The name of this product.
    pub const NAME: &'static str = "executor-only";
}

impl BrowserProduct for ExecutorOnlyProduct {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn supported_test_types(&self) -> &[TestType] {
        &TestType::ALL
    }

    fn check_args(&self, args: &ProductArgs) -> Result<(), ProductArgsError> {
        check_executor_command(Self::NAME, args)
    }

    fn browser(
        &self,
        _args: &ProductArgs,
        _manager: ManagerId,
    ) -> Result<Box<dyn Browser>, ProductArgsError> {
        Ok(Box::new(NullBrowser::new()))
    }

    fn executor_factory(
        &self,
        args: &ProductArgs,
    ) -> Result<Arc<dyn ExecutorFactory>, ProductArgsError> {
        command_executor_factory(Self::NAME, args)
    }
}

fn check_executor_command(product: &str, args: &ProductArgs) -> Result<(), ProductArgsError> {
    if args.executor_command.is_empty() {
        Err(ProductArgsError::new(product, "an executor command is required"))
    } else {
        Ok(())
    }
}

fn command_executor_factory(
    product: &str,
    args: &ProductArgs,
) -> Result<Arc<dyn ExecutorFactory>, ProductArgsError> {
    check_executor_command(product, args)?;
    Ok(Arc::new(CommandExecutorFactory::new(
        args.executor_command.clone(),
        args.base_url.clone(),
    )))
}

/// A map from product names to products.
#[derive(Clone, Debug, Default)]
pub struct ProductRegistry {
    products: BTreeMap<String, Arc<dyn BrowserProduct>>,
}

impl ProductRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry containing the products shipped with wptrunner.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry
            .register(Arc::new(CommandProduct))
            .register(Arc::new(ExecutorOnlyProduct));
        registry
    }

    /// Adds a product, replacing any product registered under the same name.
    pub fn register(&mut self, product: Arc<dyn BrowserProduct>) -> &mut Self {
        self.products.insert(product.name().to_owned(), product);
        self
    }

    /// Looks up a product by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn BrowserProduct>, ProductNotFound> {
        self.products
            .get(name)
            .cloned()
            .ok_or_else(|| ProductNotFound::new(name, self.names()))
    }

    /// Returns the names of all registered products, in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.products.keys().map(String::as_str)
    }
}
