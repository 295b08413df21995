// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The named optimization-pass catalogue: a mapping from a symbolic name
//! to a concrete ordered list of `opt` pass flags, plus the
//! `before-`/`after-` prefixed lookup the driver uses to build its
//! pre-slicing and post-slicing pass lists.

use std::collections::HashMap;

/// A mapping from catalogue name to an ordered pass-flag list. Injected
/// into the driver; this crate ships one concrete instance built from the
/// upstream project's well-known groups, but any equivalent mapping
/// satisfies the contract.
#[derive(Debug, Clone, Default)]
pub struct Catalogue(HashMap<&'static str, Vec<&'static str>>);

impl Catalogue {
    pub fn new() -> Self {
        let mut m: HashMap<&'static str, Vec<&'static str>> = HashMap::new();
        m.insert("none", vec![]);
        m.insert(
            "O2",
            vec![
                "-simplifycfg",
                "-instcombine",
                "-mem2reg",
                "-gvn",
                "-sccp",
                "-adce",
            ],
        );
        m.insert(
            "O3",
            vec![
                "-simplifycfg",
                "-instcombine",
                "-mem2reg",
                "-gvn",
                "-sccp",
                "-adce",
                "-loop-rotate",
                "-licm",
            ],
        );
        Catalogue(m)
    }

    fn get(&self, name: &str) -> Option<&Vec<&'static str>> {
        self.0.get(name)
    }

    pub fn insert(&mut self, name: &'static str, passes: Vec<&'static str>) {
        self.0.insert(name, passes);
    }
}

fn resolve_token(catalogue: &Catalogue, prefix_len: usize, opt: &str) -> Vec<String> {
    let name = &opt[prefix_len..];
    if let Some(flag) = name.strip_prefix("opt-") {
        vec![format!("-{flag}")]
    } else if let Some(passes) = catalogue.get(name) {
        passes.iter().map(|s| s.to_string()).collect()
    } else {
        Vec::new()
    }
}

/// `opt-<flag>` tokens pass through as `-<flag>` unchanged; catalogue
/// names expand to their pass list; unknown names contribute nothing.
pub fn get_optlist_before(catalogue: &Catalogue, optlevel: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    for opt in optlevel {
        if opt.starts_with("before-") {
            out.extend(resolve_token(catalogue, "before-".len(), opt));
        }
    }
    out
}

pub fn get_optlist_after(catalogue: &Catalogue, optlevel: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    for opt in optlevel {
        if opt.starts_with("after-") {
            out.extend(resolve_token(catalogue, "after-".len(), opt));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn before_and_after_are_disjoint_for_disjoint_prefixes() {
        let cat = Catalogue::new();
        let optlevel = vec!["before-O2".to_string(), "after-O3".to_string()];
        let before = get_optlist_before(&cat, &optlevel);
        let after = get_optlist_after(&cat, &optlevel);
        assert!(!before.is_empty());
        assert!(!after.is_empty());
        assert!(before.iter().all(|p| !after.contains(p)) || before != after);
    }

    #[test]
    fn opt_prefixed_token_passes_through_unchanged() {
        let cat = Catalogue::new();
        let optlevel = vec!["before-opt-my-custom-pass".to_string()];
        let before = get_optlist_before(&cat, &optlevel);
        assert_eq!(before, vec!["-my-custom-pass".to_string()]);
    }

    #[test]
    fn unrelated_tokens_are_ignored() {
        let cat = Catalogue::new();
        let optlevel = vec!["noslice".to_string()];
        assert!(get_optlist_before(&cat, &optlevel).is_empty());
        assert!(get_optlist_after(&cat, &optlevel).is_empty());
    }

    #[test]
    fn unknown_catalogue_name_contributes_nothing() {
        let cat = Catalogue::new();
        let optlevel = vec!["before-does-not-exist".to_string()];
        assert!(get_optlist_before(&cat, &optlevel).is_empty());
    }
}
