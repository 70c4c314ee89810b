//! Build hooks contributed by extensions.
//!
//! Extensions implement [`Plugin`] and are registered explicitly with a
//! [`PluginRegistry`]; nothing is discovered or loaded at runtime. A plugin
//! answers only the hooks it supports and returns `None` for the rest.

use crate::models::{BuildCommand, BuildConfiguration, BuildOutcome};
use anyhow::Result;
use std::fmt;

/// Points in a build where plugins are consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    /// After validation, before the session starts
    BeforeBuild,
    /// For every relayed output line
    OutputLine,
    /// After the session completed
    AfterBuild,
}

impl Hook {
    pub fn name(self) -> &'static str {
        match self {
            Hook::BeforeBuild => "before_build",
            Hook::OutputLine => "output_line",
            Hook::AfterBuild => "after_build",
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Arguments passed to a hook; the variant determines the [`Hook`].
#[derive(Debug, Clone, Copy)]
pub enum HookArgs<'a> {
    BeforeBuild {
        configuration: &'a BuildConfiguration,
        commands: &'a [BuildCommand],
    },
    OutputLine {
        line: &'a str,
    },
    AfterBuild {
        outcome: BuildOutcome,
    },
}

impl HookArgs<'_> {
    pub fn hook(&self) -> Hook {
        match self {
            HookArgs::BeforeBuild { .. } => Hook::BeforeBuild,
            HookArgs::OutputLine { .. } => Hook::OutputLine,
            HookArgs::AfterBuild { .. } => Hook::AfterBuild,
        }
    }
}

/// What a hook hands back: lines to show in the build output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookOutput {
    pub lines: Vec<String>,
}

impl HookOutput {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn line(text: impl Into<String>) -> Self {
        Self {
            lines: vec![text.into()],
        }
    }
}

/// An extension that can answer build hooks.
pub trait Plugin: Send + Sync {
    /// Name used in output and logs.
    fn name(&self) -> &str;

    /// `None` if this plugin does not implement `hook`.
    fn try_invoke_hook(&self, hook: Hook, args: &HookArgs<'_>) -> Option<Result<HookOutput>>;
}

/// Result of one plugin answering one hook.
#[derive(Debug)]
pub struct HookReport {
    pub plugin: String,
    pub result: Result<HookOutput>,
}

/// Registered plugins, invoked in registration order.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        tracing::info!("Registered plugin: {}", plugin.name());
        self.plugins.push(plugin);
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Offer `args` to every plugin; only plugins that handle the hook report.
    pub fn invoke(&self, args: &HookArgs<'_>) -> Vec<HookReport> {
        let hook = args.hook();
        self.plugins
            .iter()
            .filter_map(|plugin| {
                let result = plugin.try_invoke_hook(hook, args)?;
                if let Err(e) = &result {
                    tracing::warn!("Plugin {} failed in {}: {:#}", plugin.name(), hook, e);
                }
                Some(HookReport {
                    plugin: plugin.name().to_string(),
                    result,
                })
            })
            .collect()
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}
