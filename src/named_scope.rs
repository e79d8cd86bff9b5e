//! Named scopes give library files a private label namespace. A scope is created once with
//! a prefix; labels carrying that prefix are stored in the scope only when they are defined
//! in the file that created it and the scope is active on the defining line.
use crate::error::{Error, ErrorKind};
use crate::label_scope::LabelScope;
use crate::pathid::LineId;
use std::collections::HashMap;

pub const DEFAULT_SCOPE_PREFIX: &str = "_";

#[derive(Debug)]
pub struct NamedScope {
    pub name: String,
    pub prefix: String,
    pub defined_at: LineId,
    labels: LabelScope,
}

#[derive(Debug, Default)]
pub struct NamedScopeManager {
    scopes: HashMap<String, NamedScope>,
}

impl NamedScopeManager {
    pub fn new() -> Self { NamedScopeManager::default() }

    pub fn create_scope(&mut self, name: &str, prefix: &str, line: &LineId) -> Result<(), Error> {
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(Error::new(
                ErrorKind::Preprocessor,
                Some(line),
                &format!("scope name \"{}\" cannot be empty or contain whitespace", name),
            ));
        }
        if prefix.is_empty() || prefix.chars().any(char::is_whitespace) {
            return Err(Error::new(
                ErrorKind::Preprocessor,
                Some(line),
                &format!("scope prefix \"{}\" cannot be empty or contain whitespace", prefix),
            ));
        }
        if prefix.starts_with('.') {
            return Err(Error::new(
                ErrorKind::Preprocessor,
                Some(line),
                &format!("scope prefix \"{}\" cannot start with '.' since that denotes a local label", prefix),
            ));
        }
        if let Some(existing) = self.scopes.get(name) {
            return Err(Error::new(
                ErrorKind::Preprocessor,
                Some(line),
                &format!("scope \"{}\" already defined at {}", name, existing.defined_at),
            ));
        }
        if let Some(existing) = self.scopes.values().find(|s| s.prefix == prefix) {
            return Err(Error::new(
                ErrorKind::Preprocessor,
                Some(line),
                &format!(
                    "scope \"{}\" uses prefix \"{}\" which already belongs to scope \"{}\" defined at {}",
                    name, prefix, existing.name, existing.defined_at
                ),
            ));
        }
        self.scopes.insert(
            name.to_string(),
            NamedScope {
                name: name.to_string(),
                prefix: prefix.to_string(),
                defined_at: line.clone(),
                labels: LabelScope::named(name),
            },
        );
        Ok(())
    }
    pub fn get(&self, name: &str) -> Option<&NamedScope> { self.scopes.get(name) }
    pub fn contains(&self, name: &str) -> bool { self.scopes.contains_key(name) }

    /// Look the label up in the active scopes, most recently activated first.
    pub fn get_label_value(&self, label: &str, active: &ActiveNamedScopeList) -> Option<i128> {
        active
            .iter()
            .filter_map(|name| self.scopes.get(name))
            .filter(|s| label.starts_with(&s.prefix))
            .find_map(|s| s.labels.get(label).map(|e| e.value))
    }
    /// Try to bind the label in an active named scope. Returns Ok(false) when no active
    /// scope claims it, including when the matching scope was created in another file.
    pub fn set_label_value(
        &mut self, label: &str, value: i128, line: &LineId, active: &ActiveNamedScopeList,
    ) -> Result<bool, Error> {
        let owner = active
            .iter()
            .filter_map(|name| self.scopes.get(name))
            .find(|s| label.starts_with(&s.prefix))
            .map(|s| (s.name.clone(), s.defined_at.file_id == line.file_id));
        match owner {
            Some((name, true)) => match self.scopes.get_mut(&name) {
                Some(scope) => {
                    scope.labels.insert(label, value, line)?;
                    Ok(true)
                }
                None => Ok(false),
            },
            _ => Ok(false),
        }
    }
}

/// Named scopes active for a line, most recently activated first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveNamedScopeList {
    names: Vec<String>,
}

impl ActiveNamedScopeList {
    pub fn new() -> Self { ActiveNamedScopeList::default() }
    /// Activate a scope, moving it to the front if it's already active.
    pub fn activate(&mut self, name: &str) {
        self.deactivate(name);
        self.names.insert(0, name.to_string());
    }
    pub fn deactivate(&mut self, name: &str) { self.names.retain(|n| n != name); }
    pub fn clear(&mut self) { self.names.clear(); }
    pub fn contains(&self, name: &str) -> bool { self.names.iter().any(|n| n == name) }
    pub fn first(&self) -> Option<&str> { self.names.first().map(|s| s.as_str()) }
    pub fn iter(&self) -> impl Iterator<Item = &String> { self.names.iter() }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn scope_creation_rules() -> Result<(), Error> {
        let line = LineId::new(Some(0), "lib.asm", 1);
        let mut mgr = NamedScopeManager::new();
        mgr.create_scope("math", "math_", &line)?;
        assert!(mgr.create_scope("math", "m_", &line).is_err());
        assert!(mgr.create_scope("other", "math_", &line).is_err());
        assert!(mgr.create_scope("bad name", "x_", &line).is_err());
        assert!(mgr.create_scope("dotted", ".x", &line).is_err());
        Ok(())
    }
    #[test]
    fn labels_only_bind_in_the_creating_file() -> Result<(), Error> {
        let lib_line = LineId::new(Some(1), "lib.asm", 1);
        let main_line = LineId::new(Some(0), "main.asm", 7);
        let mut mgr = NamedScopeManager::new();
        mgr.create_scope("math", "math_", &lib_line)?;
        let mut active = ActiveNamedScopeList::new();
        active.activate("math");
        assert!(mgr.set_label_value("math_mul", 0x40, &lib_line, &active)?);
        assert!(!mgr.set_label_value("math_div", 0x50, &main_line, &active)?);
        assert!(!mgr.set_label_value("plain", 0x60, &lib_line, &active)?);
        assert_eq!(mgr.get_label_value("math_mul", &active), Some(0x40));
        assert_eq!(mgr.get_label_value("math_div", &active), None);
        assert_eq!(mgr.get_label_value("math_mul", &ActiveNamedScopeList::new()), None);
        Ok(())
    }
    #[test]
    fn activation_order() {
        let mut active = ActiveNamedScopeList::new();
        active.activate("a");
        active.activate("b");
        active.activate("a");
        assert_eq!(active.iter().cloned().collect::<Vec<_>>(), vec!["a".to_string(), "b".to_string()]);
        active.deactivate("a");
        assert_eq!(active.first(), Some("b"));
        active.clear();
        assert!(!active.contains("b"));
    }
}
