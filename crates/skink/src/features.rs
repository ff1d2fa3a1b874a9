//! Feature gate: per-node-category tags checked before any execution effect.
//!
//! Each gated syntax-node category maps to one [`FeatureTag`]. On entry to a
//! gated node the evaluator consults the effective [`FeatureSet`]; a disabled
//! tag raises a feature-category error before the node produces any side
//! effect. Absent configuration means "everything enabled".

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::ast::{DeclKind, ExprKind, FunctionKind, LogicalOp, StmtKind};

/// Syntax-feature tags, keyed by the era tables in [`crate::presets`].
///
/// Uses strum derives so the tag's display name matches the variant exactly;
/// feature errors name the tag (e.g. `LetConst`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter, IntoStaticStr, Serialize, Deserialize,
)]
pub enum FeatureTag {
    ArrowFunctions,
    TemplateLiterals,
    TaggedTemplates,
    Classes,
    ClassFields,
    PrivateFields,
    StaticBlocks,
    LetConst,
    Destructuring,
    Spread,
    ObjectRestSpread,
    RestParameters,
    DefaultParameters,
    ForOf,
    ForIn,
    ForAwaitOf,
    AsyncAwait,
    Generators,
    AsyncGenerators,
    OptionalChaining,
    NullishCoalescing,
    LogicalAssignment,
    Exponentiation,
    NumericSeparators,
    DynamicImport,
    BigIntLiterals,
    Hashbang,
    Modules,
    GetterSetter,
    ComputedProperties,
    Shorthand,
    WithStatement,
    Labels,
    RegexLiterals,
    SymbolUsage,
    OptionalCatchBinding,
}

/// Whitelist / blacklist interpretation of a feature list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureMode {
    Whitelist,
    Blacklist,
}

/// Host-facing feature configuration: a mode plus the listed tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureControl {
    pub mode: FeatureMode,
    pub features: Vec<FeatureTag>,
}

impl FeatureControl {
    /// Whitelist allowing exactly `features`.
    #[must_use]
    pub fn whitelist(features: Vec<FeatureTag>) -> Self {
        Self {
            mode: FeatureMode::Whitelist,
            features,
        }
    }

    /// Blacklist denying exactly `features`.
    #[must_use]
    pub fn blacklist(features: Vec<FeatureTag>) -> Self {
        Self {
            mode: FeatureMode::Blacklist,
            features,
        }
    }

    /// Merges two controls under the preset-combination rule: when modes
    /// differ the whitelist wins minus the other side's blacklist; same-mode
    /// controls union their lists.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        use FeatureMode::{Blacklist, Whitelist};
        match (self.mode, other.mode) {
            (Whitelist, Whitelist) | (Blacklist, Blacklist) => {
                let mut features = self.features.clone();
                for tag in &other.features {
                    if !features.contains(tag) {
                        features.push(*tag);
                    }
                }
                Self {
                    mode: self.mode,
                    features,
                }
            }
            (Whitelist, Blacklist) => Self {
                mode: Whitelist,
                features: self.features.iter().copied().filter(|t| !other.features.contains(t)).collect(),
            },
            (Blacklist, Whitelist) => Self {
                mode: Whitelist,
                features: other.features.iter().copied().filter(|t| !self.features.contains(t)).collect(),
            },
        }
    }
}

/// Resolved form consulted by the evaluator on every gated node.
#[derive(Debug, Clone, Default)]
pub enum FeatureSet {
    /// No configuration: everything is enabled.
    #[default]
    AllEnabled,
    /// Only the listed tags are enabled.
    Whitelist(ahash::AHashSet<FeatureTag>),
    /// Everything except the listed tags is enabled.
    Blacklist(ahash::AHashSet<FeatureTag>),
}

impl FeatureSet {
    #[must_use]
    pub fn from_control(control: &FeatureControl) -> Self {
        let set: ahash::AHashSet<FeatureTag> = control.features.iter().copied().collect();
        match control.mode {
            FeatureMode::Whitelist => Self::Whitelist(set),
            FeatureMode::Blacklist => Self::Blacklist(set),
        }
    }

    #[must_use]
    pub fn enabled(&self, tag: FeatureTag) -> bool {
        match self {
            Self::AllEnabled => true,
            Self::Whitelist(set) => set.contains(&tag),
            Self::Blacklist(set) => !set.contains(&tag),
        }
    }
}

/// Returns the gate tag for a statement node, if the category is gated.
pub(crate) fn stmt_feature(kind: &StmtKind) -> Option<FeatureTag> {
    match kind {
        StmtKind::VarDecl {
            kind: DeclKind::Let | DeclKind::Const,
            ..
        } => Some(FeatureTag::LetConst),
        StmtKind::ClassDecl(_) => Some(FeatureTag::Classes),
        StmtKind::ForIn { .. } => Some(FeatureTag::ForIn),
        StmtKind::ForOf { is_await: false, .. } => Some(FeatureTag::ForOf),
        StmtKind::ForOf { is_await: true, .. } => Some(FeatureTag::ForAwaitOf),
        StmtKind::Labeled { .. } => Some(FeatureTag::Labels),
        StmtKind::With { .. } => Some(FeatureTag::WithStatement),
        StmtKind::Import(_) | StmtKind::Export(_) => Some(FeatureTag::Modules),
        StmtKind::FunctionDecl(func) => function_feature(func.kind),
        StmtKind::Try {
            handler: Some(clause), ..
        } if clause.param.is_none() => Some(FeatureTag::OptionalCatchBinding),
        _ => None,
    }
}

/// Returns the gate tag for an expression node, if the category is gated.
pub(crate) fn expr_feature(kind: &ExprKind) -> Option<FeatureTag> {
    match kind {
        ExprKind::Template(_) => Some(FeatureTag::TemplateLiterals),
        ExprKind::TaggedTemplate { .. } => Some(FeatureTag::TaggedTemplates),
        ExprKind::Class(_) => Some(FeatureTag::Classes),
        ExprKind::Function(func) => function_feature(func.kind),
        ExprKind::BigInt(_) => Some(FeatureTag::BigIntLiterals),
        ExprKind::Regex { .. } => Some(FeatureTag::RegexLiterals),
        ExprKind::Logical {
            op: LogicalOp::Nullish, ..
        } => Some(FeatureTag::NullishCoalescing),
        ExprKind::Binary {
            op: crate::ast::BinaryOp::Exp,
            ..
        } => Some(FeatureTag::Exponentiation),
        ExprKind::Assign { op, .. } => match op {
            crate::ast::AssignOp::AndAssign | crate::ast::AssignOp::OrAssign | crate::ast::AssignOp::NullishAssign => {
                Some(FeatureTag::LogicalAssignment)
            }
            crate::ast::AssignOp::Exp => Some(FeatureTag::Exponentiation),
            _ => None,
        },
        ExprKind::Member { optional: true, .. } | ExprKind::Call { optional: true, .. } => {
            Some(FeatureTag::OptionalChaining)
        }
        ExprKind::Yield { .. } => Some(FeatureTag::Generators),
        ExprKind::Await(_) => Some(FeatureTag::AsyncAwait),
        ExprKind::DynamicImport(_) => Some(FeatureTag::DynamicImport),
        ExprKind::PrivateIn { .. } => Some(FeatureTag::PrivateFields),
        _ => None,
    }
}

fn function_feature(kind: FunctionKind) -> Option<FeatureTag> {
    match kind {
        FunctionKind::Arrow => Some(FeatureTag::ArrowFunctions),
        FunctionKind::AsyncArrow | FunctionKind::Async => Some(FeatureTag::AsyncAwait),
        FunctionKind::Generator => Some(FeatureTag::Generators),
        FunctionKind::AsyncGenerator => Some(FeatureTag::AsyncGenerators),
        FunctionKind::Normal | FunctionKind::Method | FunctionKind::Getter | FunctionKind::Setter => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_two_whitelists_unions() {
        let a = FeatureControl::whitelist(vec![FeatureTag::LetConst]);
        let b = FeatureControl::whitelist(vec![FeatureTag::Classes, FeatureTag::LetConst]);
        let merged = a.merge(&b);
        assert_eq!(merged.mode, FeatureMode::Whitelist);
        assert_eq!(merged.features, vec![FeatureTag::LetConst, FeatureTag::Classes]);
    }

    #[test]
    fn merge_mixed_modes_whitelist_wins_minus_blacklist() {
        let wl = FeatureControl::whitelist(vec![FeatureTag::LetConst, FeatureTag::Classes]);
        let bl = FeatureControl::blacklist(vec![FeatureTag::Classes]);
        let merged = wl.merge(&bl);
        assert_eq!(merged.mode, FeatureMode::Whitelist);
        assert_eq!(merged.features, vec![FeatureTag::LetConst]);

        // Symmetric order gives the same effective set.
        let merged = bl.merge(&wl);
        assert_eq!(merged.mode, FeatureMode::Whitelist);
        assert_eq!(merged.features, vec![FeatureTag::LetConst]);
    }

    #[test]
    fn absent_configuration_enables_everything() {
        let set = FeatureSet::default();
        assert!(set.enabled(FeatureTag::Classes));
        assert!(set.enabled(FeatureTag::WithStatement));
    }

    #[test]
    fn blacklist_disables_only_listed() {
        let set = FeatureSet::from_control(&FeatureControl::blacklist(vec![FeatureTag::WithStatement]));
        assert!(!set.enabled(FeatureTag::WithStatement));
        assert!(set.enabled(FeatureTag::Classes));
    }
}
