//! Optimizer settings. [`OptimizationArgs`] is meant to be flattened into the
//! command line of whatever driver embeds the optimizer, and resolves into
//! the plain [`OptimizationConfig`] the pass manager is built from.

use core::{fmt, str::FromStr};

use clap::ValueEnum;
use itertools::Itertools;
use strum::IntoEnumIterator;
use thiserror::Error;

use crate::middle::optimization::{InlineOptions, PassKind, UnrollOptions};

pub const DEFAULT_UNROLL_FACTOR: u32 = 4;
pub const MAX_UNROLL_FACTOR: u32 = 16;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown pass `{0}`, expected one of: {known}", known = PassKind::iter().join(", "))]
    UnknownPass(String),
    #[error("pass `{0}` appears more than once in the pass order")]
    DuplicatePass(PassKind),
    #[error("pass order must name every pass exactly once, missing: {}", .0.iter().join(", "))]
    IncompletePassOrder(Vec<PassKind>),
    #[error("unroll factor must be between 1 and {max}, got {0}", max = MAX_UNROLL_FACTOR)]
    InvalidUnrollFactor(u32),
    #[error(
        "cannot combine --no-unroll with --unroll-factor={0}, use one or set --unroll-factor=1"
    )]
    UnrollFactorWithoutUnroll(u32),
}

/// A permutation of every [`PassKind`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassOrder(Vec<PassKind>);

impl PassOrder {
    pub fn new(passes: impl IntoIterator<Item = PassKind>) -> Result<Self, ConfigError> {
        let mut order = Vec::new();
        for pass in passes {
            if order.contains(&pass) {
                return Err(ConfigError::DuplicatePass(pass));
            }
            order.push(pass);
        }

        let missing = PassKind::iter()
            .filter(|pass| !order.contains(pass))
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(ConfigError::IncompletePassOrder(missing));
        }

        Ok(Self(order))
    }

    pub fn iter(&self) -> impl Iterator<Item = PassKind> + '_ {
        self.0.iter().copied()
    }
}

impl Default for PassOrder {
    fn default() -> Self {
        Self(PassKind::iter().collect())
    }
}

impl FromStr for PassOrder {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let passes = s
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| {
                name.parse::<PassKind>()
                    .map_err(|_| ConfigError::UnknownPass(name.to_owned()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(passes)
    }
}

impl fmt::Display for PassOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.iter().join(","))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TailMode {
    /// Rewrite self tail calls into loops
    #[default]
    Loop,
    /// Leave tail calls as recursion
    Off,
}

#[derive(Debug, Clone, clap::Args)]
pub struct OptimizationArgs {
    /// Disable function inlining
    #[arg(long)]
    pub no_inline: bool,

    /// Disable loop unrolling
    #[arg(long)]
    pub no_unroll: bool,

    /// How many copies of a loop body the unrolled loop runs per iteration (4
    /// when not given)
    #[arg(
        long,
        value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_UNROLL_FACTOR))
    )]
    pub unroll_factor: Option<u32>,

    /// What to do with self tail calls
    #[arg(long, value_enum, default_value_t = TailMode::Loop)]
    pub tail: TailMode,

    /// Comma separated order the passes run in
    #[arg(long, default_value = "inline,unroll,tail")]
    pub pass_order: PassOrder,

    /// Inline larger functions
    #[arg(long)]
    pub aggressive_inline: bool,

    /// Inline self-recursive functions up to the inlining depth
    #[arg(long)]
    pub inline_recursive: bool,

    #[arg(long, default_value_t = 3)]
    pub inline_depth: usize,

    /// Largest function body (in nodes) that will be inlined
    #[arg(long, default_value_t = 40)]
    pub inline_max_nodes: usize,

    /// Unroll loops with variable bounds or steps other than one
    #[arg(long)]
    pub aggressive_unroll: bool,

    /// Unroll inner loops first and allow unrolling their outer loops
    #[arg(long)]
    pub unroll_nested: bool,
}

/// Resolved optimizer settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizationConfig {
    pub pass_order: PassOrder,
    pub inline_enabled: bool,
    pub inline: InlineOptions,
    pub unroll_enabled: bool,
    pub unroll: UnrollOptions,
    pub tail_enabled: bool,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            pass_order: PassOrder::default(),
            inline_enabled: true,
            inline: InlineOptions::default(),
            unroll_enabled: true,
            unroll: UnrollOptions::default(),
            tail_enabled: true,
        }
    }
}

impl OptimizationConfig {
    /// Every pass turned off
    pub fn disabled() -> Self {
        Self {
            inline_enabled: false,
            unroll_enabled: false,
            tail_enabled: false,
            ..Self::default()
        }
    }
}

impl TryFrom<&OptimizationArgs> for OptimizationConfig {
    type Error = ConfigError;

    fn try_from(args: &OptimizationArgs) -> Result<Self, Self::Error> {
        let unroll_factor = match args.unroll_factor {
            Some(factor) if !(1..=MAX_UNROLL_FACTOR).contains(&factor) => {
                return Err(ConfigError::InvalidUnrollFactor(factor));
            }
            Some(factor) if args.no_unroll && factor > 1 => {
                return Err(ConfigError::UnrollFactorWithoutUnroll(factor));
            }
            Some(factor) => factor,
            None => DEFAULT_UNROLL_FACTOR,
        };

        Ok(Self {
            pass_order: args.pass_order.clone(),
            inline_enabled: !args.no_inline,
            inline: InlineOptions {
                aggressive: args.aggressive_inline,
                allow_recursive: args.inline_recursive,
                max_depth: args.inline_depth,
                max_nodes: args.inline_max_nodes,
                ..InlineOptions::default()
            },
            unroll_enabled: !args.no_unroll,
            unroll: UnrollOptions {
                factor: unroll_factor as usize,
                aggressive: args.aggressive_unroll,
                unroll_nested: args.unroll_nested,
                ..UnrollOptions::default()
            },
            tail_enabled: args.tail == TailMode::Loop,
        })
    }
}
