//! State shared by every stage of one assembly run.
use crate::config::AssemblerOptions;
use crate::error::{Error, ErrorKind};
use crate::label_scope::{LabelScopes, ScopeId};
use crate::line::{LineEnv, ScopedLabels};
use crate::memzone::{MemoryZoneManager, GLOBAL_ZONE_NAME};
use crate::model::AsmModel;
use crate::named_scope::{ActiveNamedScopeList, NamedScopeManager};
use crate::pathid::{FileRegistry, LineId};
use crate::preprocessor::Preprocessor;

pub struct CompilationContext<'m> {
    pub model: &'m AsmModel,
    pub options: AssemblerOptions,
    pub scopes: LabelScopes,
    pub named_scopes: NamedScopeManager,
    pub zones: MemoryZoneManager,
    pub preprocessor: Preprocessor,
    pub files: FileRegistry,
    pub warnings: Vec<String>,
}

impl<'m> CompilationContext<'m> {
    /// Set up zones, symbols and predefined constants for `model`.
    pub fn new(model: &'m AsmModel, options: AssemblerOptions) -> Result<Self, Error> {
        let mut zones = MemoryZoneManager::new(model.address_size, model.origin)?;
        for zone in &model.memory_zones {
            if zone.name == GLOBAL_ZONE_NAME {
                zones.redefine_global(zone.start, zone.end, model.origin)?;
            } else {
                zones.create_zone(zone.start, zone.end, &zone.name, None)?;
            }
        }
        let preprocessor = Preprocessor::for_model(model, &options.defines)?;
        let mut scopes = LabelScopes::new();
        let isa_line = LineId::synthetic(&model.name);
        let global = scopes.global();
        for (name, value) in &model.constants {
            scopes.set_label_value(global, name, *value, &isa_line)?;
        }
        Ok(CompilationContext {
            model,
            options,
            scopes,
            named_scopes: NamedScopeManager::new(),
            zones,
            preprocessor,
            files: FileRegistry::new(),
            warnings: Vec::new(),
        })
    }

    /// Report a warning, or fail if warnings are errors.
    pub fn warn(&mut self, line: Option<&LineId>, msg: &str) -> Result<(), Error> {
        let text = match line {
            Some(l) => format!("{} - {}", l, msg),
            None => msg.to_string(),
        };
        if self.options.warnings_as_errors {
            return Err(Error::new(ErrorKind::Warning, line, msg));
        }
        warn!("{}", text);
        self.warnings.push(text);
        Ok(())
    }
    /// Print when the run is at least as verbose as `level`.
    pub fn log(&self, level: u8, msg: &str) {
        if self.options.verbosity >= level {
            info!("{}", msg);
        }
    }

    pub fn env(&self) -> LineEnv {
        LineEnv {
            model: self.model,
            zones: &self.zones,
            scopes: &self.scopes,
            named: &self.named_scopes,
        }
    }
    pub fn labels<'a>(&'a self, scope: ScopeId, active: &'a ActiveNamedScopeList) -> ScopedLabels<'a> {
        ScopedLabels {
            scopes: &self.scopes,
            named: &self.named_scopes,
            scope,
            active,
        }
    }

    /// Bind a label into an active named scope that claims it, or else into the scope chain.
    pub fn bind_label(
        &mut self, scope: ScopeId, active: &ActiveNamedScopeList, label: &str, value: i128, line: &LineId,
    ) -> Result<(), Error> {
        if self.named_scopes.set_label_value(label, value, line, active)? {
            return Ok(());
        }
        self.scopes.set_label_value(scope, label, value, line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TEST_ISA;

    #[test]
    fn predefined_constants_and_warnings() -> Result<(), Error> {
        let model = AsmModel::from_yaml_str(TEST_ISA, "test")?;
        let mut ctx = CompilationContext::new(&model, AssemblerOptions::default())?;
        let active = ActiveNamedScopeList::new();
        let global = ctx.scopes.global();
        use crate::parse::LabelResolver;
        assert_eq!(ctx.labels(global, &active).resolve("io_port"), Some(0x80));
        let line = LineId::synthetic("warn");
        ctx.warn(Some(&line), "just so you know")?;
        assert_eq!(ctx.warnings.len(), 1);
        ctx.options.warnings_as_errors = true;
        let err = ctx.warn(Some(&line), "now it matters").err().map(|e| e.kind);
        assert_eq!(err, Some(ErrorKind::Warning));
        Ok(())
    }
}
