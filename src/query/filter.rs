use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::SqlParams;
use crate::error::{Error, Result};
use crate::model::TaskState;

/// Task criteria shared by every report query. Empty lists do not filter.
///
/// Rendered against the aliases `t` (tasks) and `c` (the task's
/// classification).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportFilter {
    workbasket_ids: Vec<String>,
    states: Vec<TaskState>,
    categories: Vec<String>,
    classification_ids: Vec<String>,
    excluded_classification_ids: Vec<String>,
    domains: Vec<String>,
    custom_attributes: BTreeMap<String, String>,
}

impl ReportFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn workbasket(mut self, id: &str) -> Self {
        self.workbasket_ids.push(id.to_string());
        self
    }

    pub fn state(mut self, state: TaskState) -> Self {
        self.states.push(state);
        self
    }

    pub fn category(mut self, category: &str) -> Self {
        self.categories.push(category.to_string());
        self
    }

    pub fn classification(mut self, id: &str) -> Self {
        self.classification_ids.push(id.to_string());
        self
    }

    pub fn exclude_classification(mut self, id: &str) -> Self {
        self.excluded_classification_ids.push(id.to_string());
        self
    }

    pub fn domain(mut self, domain: &str) -> Self {
        self.domains.push(domain.to_string());
        self
    }

    /// Only tasks whose attribute `name` equals `value`.
    pub fn custom_attribute(mut self, name: &str, value: &str) -> Self {
        self.custom_attributes
            .insert(name.to_string(), value.to_string());
        self
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in &self.custom_attributes {
            if name.trim().is_empty() || value.is_empty() {
                return Err(Error::invalid(format!(
                    "custom attribute filter needs a name and a value, got '{name}' = '{value}'"
                )));
            }
        }
        Ok(())
    }

    /// WHERE conditions, all to be ANDed. Parameters are appended to `params`.
    pub(crate) fn conditions(&self, params: &mut SqlParams) -> Vec<String> {
        let mut wheres = Vec::new();

        if !self.workbasket_ids.is_empty() {
            wheres.push(format!(
                "t.workbasket_id IN ({})",
                params.push_all(&self.workbasket_ids)
            ));
        }

        if !self.states.is_empty() {
            let states: Vec<&'static str> = self.states.iter().map(TaskState::as_str).collect();
            wheres.push(format!("t.state IN ({})", params.push_all(&states)));
        }

        if !self.categories.is_empty() {
            wheres.push(format!("c.category IN ({})", params.push_all(&self.categories)));
        }

        if !self.classification_ids.is_empty() {
            wheres.push(format!(
                "t.classification_id IN ({})",
                params.push_all(&self.classification_ids)
            ));
        }

        if !self.excluded_classification_ids.is_empty() {
            wheres.push(format!(
                "(t.classification_id IS NULL OR t.classification_id NOT IN ({}))",
                params.push_all(&self.excluded_classification_ids)
            ));
        }

        if !self.domains.is_empty() {
            wheres.push(format!("t.domain IN ({})", params.push_all(&self.domains)));
        }

        for (i, (name, value)) in self.custom_attributes.iter().enumerate() {
            let name = params.push(name.clone());
            let value = params.push(value.clone());
            wheres.push(format!(
                "EXISTS (SELECT 1 FROM task_custom_attributes f{i} \
                 WHERE f{i}.task_id = t.id AND f{i}.name = {name} AND f{i}.value = {value})"
            ));
        }

        wheres
    }
}
