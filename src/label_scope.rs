//! The hierarchical symbol table. Scopes live in an arena and refer to their parent by
//! [ScopeId]; the GLOBAL scope is always id 0.
//!
//! The tier a label belongs to comes from its spelling:
//!  * `.name` - LOCAL, visible between two non-local labels
//!  * `_name` - FILE, visible in the defining file
//!  * `name`  - GLOBAL
use crate::error::{Error, ErrorKind};
use crate::pathid::LineId;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ScopeTier {
    Global,
    File,
    Local,
    /// private table of a named scope; never part of the parent chain
    Named,
}

impl ScopeTier {
    pub fn for_label(label: &str) -> ScopeTier {
        if label.starts_with('.') {
            ScopeTier::Local
        } else if label.starts_with('_') {
            ScopeTier::File
        } else {
            ScopeTier::Global
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

#[derive(Debug, Clone)]
pub struct LabelEntry {
    pub value: i128,
    pub line: LineId,
}

#[derive(Debug)]
pub struct LabelScope {
    pub tier: ScopeTier,
    pub parent: Option<ScopeId>,
    /// what opened the scope: a file name or the label that started a local block
    pub reference: String,
    order: Vec<String>,
    labels: HashMap<String, LabelEntry>,
}

impl LabelScope {
    fn new(tier: ScopeTier, parent: Option<ScopeId>, reference: &str) -> Self {
        LabelScope {
            tier,
            parent,
            reference: reference.to_string(),
            order: Vec::new(),
            labels: HashMap::new(),
        }
    }
    /// A free-standing scope used as the table of a named scope.
    pub fn named(name: &str) -> Self { LabelScope::new(ScopeTier::Named, None, name) }
    pub fn get(&self, label: &str) -> Option<&LabelEntry> { self.labels.get(label) }
    /// Labels in definition order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &LabelEntry)> {
        self.order.iter().filter_map(move |l| self.labels.get(l).map(|e| (l, e)))
    }
    /// Insert a label directly into this scope. Errors on duplicates.
    pub fn insert(&mut self, label: &str, value: i128, line: &LineId) -> Result<(), Error> {
        if let Some(existing) = self.labels.get(label) {
            return Err(Error::new(
                ErrorKind::Label,
                Some(line),
                &format!("label \"{}\" already defined at {}", label, existing.line),
            ));
        }
        self.order.push(label.to_string());
        self.labels.insert(
            label.to_string(),
            LabelEntry {
                value,
                line: line.clone(),
            },
        );
        Ok(())
    }
}

#[derive(Debug)]
pub struct LabelScopes {
    scopes: Vec<LabelScope>,
}

impl Default for LabelScopes {
    fn default() -> Self { Self::new() }
}

impl LabelScopes {
    pub fn new() -> Self {
        LabelScopes {
            scopes: vec![LabelScope::new(ScopeTier::Global, None, "GLOBAL")],
        }
    }
    pub fn global(&self) -> ScopeId { ScopeId(0) }
    pub fn get(&self, id: ScopeId) -> &LabelScope { &self.scopes[id.0] }
    pub fn new_file_scope(&mut self, file_name: &str) -> ScopeId {
        self.scopes.push(LabelScope::new(ScopeTier::File, Some(ScopeId(0)), file_name));
        ScopeId(self.scopes.len() - 1)
    }
    /// Open a LOCAL scope under the file scope that (directly or indirectly) owns `within`.
    pub fn new_local_scope(&mut self, within: ScopeId, label: &str) -> ScopeId {
        let file_scope = self.enclosing(within, ScopeTier::File).unwrap_or(within);
        self.scopes.push(LabelScope::new(ScopeTier::Local, Some(file_scope), label));
        ScopeId(self.scopes.len() - 1)
    }
    /// Walk up from `from` to the first scope of `tier`. None if the walk passes it.
    pub fn enclosing(&self, from: ScopeId, tier: ScopeTier) -> Option<ScopeId> {
        let mut id = from;
        loop {
            let scope = &self.scopes[id.0];
            if scope.tier == tier {
                return Some(id);
            }
            if scope.tier < tier {
                return None;
            }
            id = scope.parent?;
        }
    }
    /// Bind `label` in the scope its spelling calls for, starting from `scope`.
    pub fn set_label_value(&mut self, scope: ScopeId, label: &str, value: i128, line: &LineId) -> Result<(), Error> {
        let tier = ScopeTier::for_label(label);
        match self.enclosing(scope, tier) {
            Some(target) => self.scopes[target.0].insert(label, value, line),
            None => Err(Error::new(
                ErrorKind::Label,
                Some(line),
                &format!(
                    "label \"{}\" requires a {:?} scope but is defined in a {:?} scope",
                    label, tier, self.scopes[scope.0].tier
                ),
            )),
        }
    }
    pub fn get_label_value(&self, scope: ScopeId, label: &str) -> Option<i128> {
        let target = self.enclosing(scope, ScopeTier::for_label(label))?;
        self.scopes[target.0].get(label).map(|e| e.value)
    }
}
