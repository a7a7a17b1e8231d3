//! Declarative rule merging
//!
//! Rules of one group that differ only in a mergeable field collapse into a
//! single record. Two rules share a template when they are equal once the
//! id and the mergeable field are cleared; the first rule of a template is
//! the accumulator and keeps its id.

use std::collections::HashMap;

use dnr_core::{
    DeclarativeRule, ModifyHeaderInfo, QueryTransform, Redirect, RuleAction, UrlTransform,
};

use crate::error::{ConvertError, SourceMapEntry};

const CSP_VALUE_SEPARATOR: &str = "; ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Joins header values of matching CSP operations
    Csp,
    /// Concatenates request and response header operations
    RemoveHeader,
    /// Concatenates removed query parameter names
    RemoveParam,
}

impl MergeStrategy {
    /// Comparison key: the rule without its id and mergeable field.
    pub fn template(self, rule: &DeclarativeRule) -> DeclarativeRule {
        let mut template = rule.clone();
        template.id = 0;

        match (self, &mut template.action) {
            (
                Self::Csp,
                RuleAction::ModifyHeaders {
                    request_headers,
                    response_headers,
                },
            ) => {
                for header in request_headers
                    .iter_mut()
                    .chain(response_headers.iter_mut())
                    .flatten()
                {
                    header.value = None;
                }
            }
            (
                Self::RemoveHeader,
                RuleAction::ModifyHeaders {
                    request_headers,
                    response_headers,
                },
            ) => {
                *request_headers = None;
                *response_headers = None;
            }
            (Self::RemoveParam, RuleAction::Redirect { redirect }) => {
                if let Some(query_transform) = redirect
                    .transform
                    .as_mut()
                    .and_then(|transform| transform.query_transform.as_mut())
                {
                    query_transform.remove_params = None;
                }
            }
            _ => {}
        }

        template
    }

    /// New record holding `acc` with the mergeable field of `next` folded in.
    pub fn combine(self, acc: &DeclarativeRule, next: &DeclarativeRule) -> DeclarativeRule {
        let action = match (self, &acc.action, &next.action) {
            (
                Self::Csp,
                RuleAction::ModifyHeaders {
                    request_headers: acc_request,
                    response_headers: acc_response,
                },
                RuleAction::ModifyHeaders {
                    request_headers: next_request,
                    response_headers: next_response,
                },
            ) => RuleAction::ModifyHeaders {
                request_headers: join_header_values(acc_request, next_request),
                response_headers: join_header_values(acc_response, next_response),
            },
            (
                Self::RemoveHeader,
                RuleAction::ModifyHeaders {
                    request_headers: acc_request,
                    response_headers: acc_response,
                },
                RuleAction::ModifyHeaders {
                    request_headers: next_request,
                    response_headers: next_response,
                },
            ) => RuleAction::ModifyHeaders {
                request_headers: concat(acc_request, next_request),
                response_headers: concat(acc_response, next_response),
            },
            (
                Self::RemoveParam,
                RuleAction::Redirect { redirect: acc_redirect },
                RuleAction::Redirect {
                    redirect: next_redirect,
                },
            ) => RuleAction::Redirect {
                redirect: Redirect {
                    transform: merge_transforms(acc_redirect, next_redirect),
                    ..acc_redirect.clone()
                },
            },
            _ => acc.action.clone(),
        };

        DeclarativeRule {
            id: acc.id,
            priority: acc.priority,
            action,
            condition: acc.condition.clone(),
        }
    }
}

fn join_header_values(
    acc: &Option<Vec<ModifyHeaderInfo>>,
    next: &Option<Vec<ModifyHeaderInfo>>,
) -> Option<Vec<ModifyHeaderInfo>> {
    let acc = acc.as_ref()?;
    let Some(next) = next else {
        return Some(acc.clone());
    };

    let joined = acc
        .iter()
        .zip(next)
        .map(|(a, b)| {
            let value = match (&a.value, &b.value) {
                (Some(a), Some(b)) => Some(format!("{a}{CSP_VALUE_SEPARATOR}{b}")),
                (a, b) => a.clone().or_else(|| b.clone()),
            };
            ModifyHeaderInfo {
                value,
                ..a.clone()
            }
        })
        .collect();
    Some(joined)
}

fn concat<T: Clone>(a: &Option<Vec<T>>, b: &Option<Vec<T>>) -> Option<Vec<T>> {
    match (a, b) {
        (None, None) => None,
        (a, b) => Some(a.iter().chain(b.iter()).flatten().cloned().collect()),
    }
}

/// `acc`'s transform with the removed params of both sides; unchanged when
/// neither side removes params.
fn merge_transforms(acc: &Redirect, next: &Redirect) -> Option<UrlTransform> {
    let remove_params = concat(&removed_params(acc), &removed_params(next));
    if remove_params.is_none() {
        return acc.transform.clone();
    }

    Some(UrlTransform {
        query: acc
            .transform
            .as_ref()
            .and_then(|transform| transform.query.clone()),
        query_transform: Some(QueryTransform { remove_params }),
    })
}

fn removed_params(redirect: &Redirect) -> Option<Vec<String>> {
    redirect
        .transform
        .as_ref()
        .and_then(|transform| transform.query_transform.as_ref())
        .and_then(|query_transform| query_transform.remove_params.clone())
}

/// Fold `rules` left to right, merging every rule into the first earlier rule
/// with the same template. Source map entries of merged rules are repointed
/// to the surviving id; a rule without any entry is an error.
pub fn merge_rules(
    strategy: MergeStrategy,
    rules: Vec<DeclarativeRule>,
    source_map: Vec<SourceMapEntry>,
) -> Result<(Vec<DeclarativeRule>, Vec<SourceMapEntry>), ConvertError> {
    let mut sources: HashMap<u32, Vec<SourceMapEntry>> = HashMap::new();
    for entry in source_map {
        sources.entry(entry.declarative_rule_id).or_default().push(entry);
    }

    let mut merged: Vec<DeclarativeRule> = Vec::with_capacity(rules.len());
    let mut merged_sources: Vec<Vec<SourceMapEntry>> = Vec::with_capacity(rules.len());
    let mut by_template: HashMap<DeclarativeRule, usize> = HashMap::new();

    for rule in rules {
        let entries = sources
            .remove(&rule.id)
            .ok_or(ConvertError::MissingSourceMap(rule.id))?;
        let key = strategy.template(&rule);

        match by_template.get(&key).copied() {
            Some(index) => {
                let acc = &merged[index];
                log::trace!("merging rule {} into {}", rule.id, acc.id);

                let combined = strategy.combine(acc, &rule);
                by_template.remove(&strategy.template(acc));
                by_template.insert(strategy.template(&combined), index);

                merged_sources[index].extend(entries.into_iter().map(|entry| SourceMapEntry {
                    declarative_rule_id: combined.id,
                    ..entry
                }));
                merged[index] = combined;
            }
            None => {
                by_template.insert(key, merged.len());
                merged.push(rule);
                merged_sources.push(entries);
            }
        }
    }

    Ok((merged, merged_sources.into_iter().flatten().collect()))
}
