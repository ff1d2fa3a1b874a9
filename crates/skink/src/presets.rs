//! Era presets and the preset-merge combinator.
//!
//! An era preset is an [`InterpreterOptions`] bundle whose feature control
//! whitelists the syntax of that specification year, cumulatively. Host
//! add-on bundles (console, timers, codecs, …) are plain `globals` bundles
//! built by the embedding; the combinator merges any number of bundles.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::{
    engine::InterpreterOptions,
    features::{FeatureControl, FeatureTag},
};

/// ECMAScript era selectable as a baseline feature set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, EnumString, EnumIter, Serialize, Deserialize)]
pub enum Era {
    #[strum(serialize = "ES5")]
    Es5,
    /// ES2015, a.k.a. ES6.
    #[strum(serialize = "ES2015", serialize = "ES6")]
    Es2015,
    #[strum(serialize = "ES2016")]
    Es2016,
    #[strum(serialize = "ES2017")]
    Es2017,
    #[strum(serialize = "ES2018")]
    Es2018,
    #[strum(serialize = "ES2019")]
    Es2019,
    #[strum(serialize = "ES2020")]
    Es2020,
    #[strum(serialize = "ES2021")]
    Es2021,
    #[strum(serialize = "ES2022")]
    Es2022,
    #[strum(serialize = "ES2023")]
    Es2023,
    #[strum(serialize = "ES2024")]
    Es2024,
    #[strum(serialize = "ESNext")]
    EsNext,
}

/// Feature tags introduced at each era (cumulative).
fn era_additions(era: Era) -> &'static [FeatureTag] {
    use FeatureTag::*;
    match era {
        Era::Es5 => &[ForIn, Labels, WithStatement, RegexLiterals, GetterSetter, OptionalCatchBinding],
        Era::Es2015 => &[
            LetConst,
            ArrowFunctions,
            Classes,
            TemplateLiterals,
            TaggedTemplates,
            Destructuring,
            Spread,
            RestParameters,
            DefaultParameters,
            ForOf,
            Generators,
            Modules,
            ComputedProperties,
            Shorthand,
            SymbolUsage,
        ],
        Era::Es2016 => &[Exponentiation],
        Era::Es2017 => &[AsyncAwait],
        Era::Es2018 => &[AsyncGenerators, ForAwaitOf, ObjectRestSpread],
        Era::Es2019 => &[],
        Era::Es2020 => &[OptionalChaining, NullishCoalescing, BigIntLiterals, DynamicImport],
        Era::Es2021 => &[LogicalAssignment, NumericSeparators],
        Era::Es2022 => &[ClassFields, PrivateFields, StaticBlocks],
        Era::Es2023 => &[Hashbang],
        Era::Es2024 => &[],
        Era::EsNext => &[],
    }
}

/// Whitelist of every feature available up to and including `era`.
#[must_use]
pub fn era_features(era: Era) -> Vec<FeatureTag> {
    use strum::IntoEnumIterator;
    if era == Era::EsNext {
        return FeatureTag::iter().collect();
    }
    let mut features = Vec::new();
    for step in [
        Era::Es5,
        Era::Es2015,
        Era::Es2016,
        Era::Es2017,
        Era::Es2018,
        Era::Es2019,
        Era::Es2020,
        Era::Es2021,
        Era::Es2022,
        Era::Es2023,
        Era::Es2024,
    ] {
        if step > era {
            break;
        }
        features.extend_from_slice(era_additions(step));
    }
    features
}

/// Options bundle for one era: a cumulative feature whitelist, nothing else.
#[must_use]
pub fn era_preset(era: Era) -> InterpreterOptions {
    InterpreterOptions {
        feature_control: Some(FeatureControl::whitelist(era_features(era))),
        ..InterpreterOptions::default()
    }
}

/// Merges option bundles left to right.
///
/// `globals` shallow-merge with later bundles winning; feature controls merge
/// under the whitelist-wins rule; `security`, `validator`, `modules`, and
/// `limits` take the later bundle when it supplies one.
#[must_use]
pub fn merge_presets(bundles: impl IntoIterator<Item = InterpreterOptions>) -> InterpreterOptions {
    let mut merged = InterpreterOptions::default();
    for bundle in bundles {
        merged.feature_control = match (merged.feature_control.take(), bundle.feature_control) {
            (Some(a), Some(b)) => Some(a.merge(&b)),
            (a, b) => b.or(a),
        };
        for (name, value) in bundle.globals {
            merged.globals.insert(name, value);
        }
        if bundle.security.is_some() {
            merged.security = bundle.security;
        }
        if bundle.validator.is_some() {
            merged.validator = bundle.validator;
        }
        if bundle.modules.enabled || bundle.modules.resolver.is_some() {
            merged.modules = bundle.modules;
        }
        if bundle.limits != crate::resource::Limits::default() {
            merged.limits = bundle.limits;
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{FeatureMode, FeatureSet};

    #[test]
    fn es5_gates_let_const() {
        let preset = era_preset(Era::Es5);
        let set = FeatureSet::from_control(preset.feature_control.as_ref().unwrap());
        assert!(!set.enabled(FeatureTag::LetConst));
        assert!(set.enabled(FeatureTag::ForIn));
    }

    #[test]
    fn eras_are_cumulative() {
        let es2020 = era_features(Era::Es2020);
        assert!(es2020.contains(&FeatureTag::OptionalChaining));
        assert!(es2020.contains(&FeatureTag::Classes));
        assert!(!es2020.contains(&FeatureTag::StaticBlocks));

        let es2022 = era_features(Era::Es2022);
        assert!(es2022.contains(&FeatureTag::StaticBlocks));
    }

    #[test]
    fn esnext_enables_everything() {
        use strum::IntoEnumIterator;
        let all = era_features(Era::EsNext);
        for tag in FeatureTag::iter() {
            assert!(all.contains(&tag), "missing {tag}");
        }
    }

    #[test]
    fn era_names_parse() {
        assert_eq!("ES6".parse::<Era>().unwrap(), Era::Es2015);
        assert_eq!("ES2024".parse::<Era>().unwrap(), Era::Es2024);
    }

    #[test]
    fn merge_prefers_later_globals_and_whitelists() {
        let a = InterpreterOptions {
            globals: [("x".to_owned(), crate::host::HostValue::Number(1.0))].into_iter().collect(),
            feature_control: Some(FeatureControl::whitelist(vec![FeatureTag::LetConst])),
            ..InterpreterOptions::default()
        };
        let b = InterpreterOptions {
            globals: [("x".to_owned(), crate::host::HostValue::Number(2.0))].into_iter().collect(),
            feature_control: Some(FeatureControl::blacklist(vec![FeatureTag::LetConst])),
            ..InterpreterOptions::default()
        };
        let merged = merge_presets([a, b]);
        assert_eq!(merged.globals["x"], crate::host::HostValue::Number(2.0));
        let control = merged.feature_control.unwrap();
        assert_eq!(control.mode, FeatureMode::Whitelist);
        assert!(control.features.is_empty());
    }
}
