//! Addressable option trees built from API schema selectors.
//!
//! An option mirrors one [`Selector`] node: `label`, `sub_label` (the display
//! type), and `value` (the pointer). Conversion is purely structural; no
//! filtering happens here. Compatibility is decided by the resolver.

use serde::Serialize;

use crate::types::Selector;

/// A selectable node in an option tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectorOption<'a> {
    pub label: &'a str,
    pub sub_label: &'a str,
    pub value: &'a str,
    #[serde(skip)]
    pub selector: &'a Selector,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<SelectorOption<'a>>>,
}

impl<'a> SelectorOption<'a> {
    pub fn from_selector(selector: &'a Selector) -> Self {
        Self {
            label: &selector.label,
            sub_label: &selector.type_label,
            value: &selector.pointer,
            selector,
            children: selector
                .children
                .as_ref()
                .map(|children| to_addressable_options(children)),
        }
    }

    pub fn children(&self) -> &[SelectorOption<'a>] {
        self.children.as_deref().unwrap_or(&[])
    }
}

/// Map selectors to options, preserving order and nesting.
pub fn to_addressable_options(selectors: &[Selector]) -> Vec<SelectorOption<'_>> {
    selectors.iter().map(SelectorOption::from_selector).collect()
}

/// Keep options whose label, or any descendant's label, contains `query`.
///
/// Matching is case-insensitive. A node that matches keeps its full subtree;
/// a node kept only for a matching descendant keeps only the matching
/// branches. An empty query returns the tree unchanged.
pub fn filter_options<'a>(options: &[SelectorOption<'a>], query: &str) -> Vec<SelectorOption<'a>> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return options.to_vec();
    }
    options
        .iter()
        .filter_map(|option| filter_option(option, &needle))
        .collect()
}

fn filter_option<'a>(option: &SelectorOption<'a>, needle: &str) -> Option<SelectorOption<'a>> {
    if option.label.to_lowercase().contains(needle) {
        return Some(option.clone());
    }

    let children: Vec<SelectorOption<'a>> = option
        .children()
        .iter()
        .filter_map(|child| filter_option(child, needle))
        .collect();

    if children.is_empty() {
        None
    } else {
        Some(SelectorOption {
            children: Some(children),
            ..option.clone()
        })
    }
}

/// Find the option addressed by `pointer` anywhere in the tree.
pub fn find_option<'o, 'a>(
    options: &'o [SelectorOption<'a>],
    pointer: &str,
) -> Option<&'o SelectorOption<'a>> {
    options.iter().find_map(|option| {
        if option.value == pointer {
            Some(option)
        } else {
            find_option(option.children(), pointer)
        }
    })
}

/// Depth-first, pre-order list of every option in the tree.
pub fn flatten_options<'o, 'a>(options: &'o [SelectorOption<'a>]) -> Vec<&'o SelectorOption<'a>> {
    let mut out = Vec::new();
    collect_options(options, &mut out);
    out
}

fn collect_options<'o, 'a>(options: &'o [SelectorOption<'a>], out: &mut Vec<&'o SelectorOption<'a>>) {
    for option in options {
        out.push(option);
        collect_options(option.children(), out);
    }
}
