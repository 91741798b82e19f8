pub mod classifier;
pub mod identity;
pub mod merge;
pub mod modules;
pub mod parser;
pub mod pipeline;
pub mod progress;
pub mod symbols;
pub mod syntax;
pub mod traversal;
pub mod usage;
pub mod walker;

pub use classifier::{classify, Classification};
pub use identity::{strategy_for, IdentityStrategy, Nesting, Resolution, StrategyKind};
pub use merge::MergeEngine;
pub use modules::ModuleResolver;
pub use parser::{ParsedFile, Parser};
pub use pipeline::{run, RunSummary};
pub use progress::{FileCounts, IndexingProgress, ProgressSnapshot};
pub use symbols::{ProjectSymbols, SourceProvider};
pub use traversal::{Orchestrator, UnsupportedSyntaxBreaker};
pub use usage::{UsageEvent, UsageKind};
pub use walker::FileWalker;
