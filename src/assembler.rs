//! The assembler proper: loads a source file (and everything it includes) into line objects,
//! then builds the image in two passes.
//!
//! 1. Every compilable line object is placed in its memory zone, which also gives labels
//!    their values.
//! 2. Objects are sorted by address, generate their words and are checked for overlaps.
//!
//! Finally the words of the unmuted objects are laid out between the start and end addresses,
//! with the fill word in the gaps.
use crate::bytecode::{low_mask, words_to_bytes, Word};
use crate::config::AssemblerOptions;
use crate::context::CompilationContext;
use crate::error::{Error, ErrorKind};
use crate::label_scope::{ScopeId, ScopeTier};
use crate::line::factory::{split_comment, LineFactory, LineState};
use crate::line::{LineKind, LineObject};
use crate::memzone::GLOBAL_ZONE_NAME;
use crate::model::AsmModel;
use crate::named_scope::ActiveNamedScopeList;
use crate::parse::Expression;
use crate::pathid::{canonical, LineId};
use crate::preprocessor::condition::{Condition, ConditionStack};
use crate::preprocessor::directive::Directive;
use crate::program::Program;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

pub struct Assembler<'m> {
    model: &'m AsmModel,
    factory: LineFactory,
}

/// Loader state for one source file.
struct FileState {
    path: PathBuf,
    file_scope: ScopeId,
    line: LineState,
    conditions: ConditionStack,
    /// named scopes created in this file or the files it includes
    defined_scopes: BTreeSet<String>,
    used_scopes: Vec<(String, LineId)>,
}

fn include_err(line: &LineId, msg: String) -> Error { Error::new(ErrorKind::Include, Some(line), &msg) }

impl<'m> Assembler<'m> {
    pub fn new(model: &'m AsmModel) -> Result<Assembler<'m>, Error> {
        Ok(Assembler {
            model,
            factory: LineFactory::new()?,
        })
    }

    /// Assemble the program whose top-level source is `path`.
    pub fn assemble_file(&self, path: &Path, options: AssemblerOptions) -> Result<Program, Error> {
        let path = path.canonicalize().map_err(|e| {
            Error::new(
                ErrorKind::IO,
                None,
                &format!("can't open source file {}: {}", path.display(), e),
            )
        })?;
        let mut ctx = CompilationContext::new(self.model, options)?;
        let predefined = self.predefined_data(&mut ctx)?;

        // the source's own directory, then -I directories, without repeats
        let mut search_dirs: Vec<PathBuf> = Vec::new();
        let source_dir = path.parent().map(Path::to_path_buf).into_iter();
        for dir in source_dir.chain(ctx.options.include_paths.iter().cloned()) {
            let dir = canonical(&dir);
            if !search_dirs.contains(&dir) {
                search_dirs.push(dir);
            }
        }

        ctx.log(1, &format!("Assembling {} for {} v{}", path.display(), self.model.name, self.model.version));
        let mut lines = Vec::new();
        self.load_file(&mut ctx, &path, &search_dirs, None, &mut lines)?;
        ctx.log(2, &format!("Loaded {} line objects from {} file(s)", lines.len(), ctx.files.len()));

        ctx.log(2, "Pass 1: assigning addresses");
        self.assign_addresses(&mut ctx, &mut lines)?;
        let mut placed: Vec<LineObject> = lines.into_iter().filter(|l| l.compilable).chain(predefined).collect();
        placed.sort_by_key(|l| l.address.unwrap_or_default());

        ctx.log(2, "Pass 2: generating bytecode");
        self.generate_words(&mut ctx, &mut placed)?;

        let (start, image) = self.emit(&ctx, &placed)?;
        ctx.log(1, &format!("Generated {} bytes", image.len()));
        Ok(Program {
            lines: placed,
            image,
            start,
            word_size: self.model.word_size,
            warnings: ctx.warnings,
        })
    }

    /// Blocks of repeated words the ISA places at fixed addresses, each with a global label.
    fn predefined_data(&self, ctx: &mut CompilationContext) -> Result<Vec<LineObject>, Error> {
        let mut blocks = Vec::new();
        let global_zone = ctx.zones.global_zone();
        let global_scope = ctx.scopes.global();
        for block in &self.model.data_blocks {
            let line_id = LineId::synthetic(&format!("{} predefined data {}", self.model.name, block.name));
            let kind = LineKind::Fill {
                count: Expression::literal(block.size as i128),
                value: Expression::literal(block.value),
            };
            let mut obj = LineObject::new(&line_id, &block.name, "", global_zone, global_scope, kind);
            obj.assign_address(block.address, &ctx.env())?;
            ctx.scopes.set_label_value(global_scope, &block.name, block.address, &line_id)?;
            blocks.push(obj);
        }
        Ok(blocks)
    }

    /// Read one source file into `lines`, following its includes. Returns the named scopes
    /// created in the file and in everything it included.
    fn load_file(
        &self, ctx: &mut CompilationContext, path: &Path, search_dirs: &[PathBuf], from: Option<&LineId>,
        lines: &mut Vec<LineObject>,
    ) -> Result<BTreeSet<String>, Error> {
        let text = fs::read_to_string(path).map_err(|e| {
            let err: Error = e.into();
            match from {
                Some(line) => err.at(line),
                None => err,
            }
        })?;
        let file_id = ctx.files.create_id_for_path(path);
        ctx.log(2, &format!("Loading file: {}", path.display()));
        let file_scope = ctx.scopes.new_file_scope(&path.display().to_string());
        let mut state = FileState {
            path: path.to_path_buf(),
            file_scope,
            line: LineState {
                zone: ctx.zones.global_zone(),
                scope: file_scope,
                named_scopes: ActiveNamedScopeList::new(),
                compilable: true,
                muted: false,
            },
            conditions: ConditionStack::new(),
            defined_scopes: BTreeSet::new(),
            used_scopes: Vec::new(),
        };

        for (n, src) in text.lines().enumerate() {
            let line_id = LineId::for_path(file_id, path, n + 1);
            let active = state.conditions.currently_active(&ctx.preprocessor)?;
            let trimmed = src.trim();
            if let Some(body) = trimmed.strip_prefix('#') {
                let word = body.split_whitespace().next().unwrap_or("");
                if active || Condition::is_conditional_directive(word) {
                    let directive = Directive::parse(trimmed, &line_id)?;
                    self.process_directive(ctx, directive, &line_id, &mut state, search_dirs, lines)?;
                }
                let mut obj = LineObject::plain(&line_id, src, state.line.zone, state.line.scope);
                obj.compilable = false;
                lines.push(obj);
                continue;
            }
            if !active {
                let (code, comment) = split_comment(src);
                let mut obj = LineObject::new(
                    &line_id,
                    code.trim(),
                    comment,
                    state.line.zone,
                    state.line.scope,
                    LineKind::Plain,
                );
                obj.compilable = false;
                obj.muted = state.conditions.is_muted();
                lines.push(obj);
                continue;
            }
            state.line.compilable = true;
            state.line.muted = state.conditions.is_muted();
            for mut obj in self.factory.parse_line(ctx, &line_id, src, &state.line)? {
                self.track_scope_and_zone(ctx, &mut state, &mut obj)?;
                lines.push(obj);
            }
        }

        if let Some(open) = state.conditions.open_block() {
            return Err(Error::new(
                ErrorKind::Preprocessor,
                Some(&open.line),
                "preprocessor condition block is never closed with #endif",
            ));
        }
        if state.conditions.is_muted() {
            let eof = LineId::for_path(file_id, path, text.lines().count());
            ctx.warn(Some(&eof), "File ended while muted; bytecode emission remains suppressed")?;
        }
        for (name, line) in &state.used_scopes {
            if !state.defined_scopes.contains(name) {
                ctx.warn(
                    Some(line),
                    &format!(
                        "Named scope {} used with #use-scope but not defined in this file or its includes",
                        name
                    ),
                )?;
            }
        }
        Ok(state.defined_scopes)
    }

    /// Follow the label, zone and constant bookkeeping a freshly parsed object implies.
    fn track_scope_and_zone(
        &self, ctx: &mut CompilationContext, state: &mut FileState, obj: &mut LineObject,
    ) -> Result<(), Error> {
        match &obj.kind {
            LineKind::Label(name) if ScopeTier::for_label(name) != ScopeTier::Local => {
                state.line.scope = ctx.scopes.new_local_scope(state.file_scope, name);
            }
            LineKind::Org { zone_name, .. } => {
                let target = match zone_name {
                    Some(name) => ctx
                        .zones
                        .zone(name)
                        .ok_or_else(|| syntax_err!(&obj.line_id, "unknown memory zone \"{}\"", name))?,
                    None => {
                        let current = ctx.zones.get(state.line.zone);
                        if current.name != GLOBAL_ZONE_NAME {
                            let msg = format!(
                                ".org without a memzone name uses an absolute address; current memzone is {}",
                                current.name
                            );
                            ctx.warn(Some(&obj.line_id), &msg)?;
                        }
                        ctx.zones.global_zone()
                    }
                };
                state.line.scope = state.file_scope;
                state.line.zone = target;
                obj.zone = target;
            }
            LineKind::SetZone(name) => {
                let target = ctx
                    .zones
                    .zone(name)
                    .ok_or_else(|| syntax_err!(&obj.line_id, "unknown memory zone \"{}\"", name))?;
                state.line.scope = state.file_scope;
                state.line.zone = target;
                obj.zone = target;
            }
            LineKind::Constant { name, value } => {
                ctx.bind_label(state.line.scope, &state.line.named_scopes, name, *value, &obj.line_id)?;
            }
            _ => {}
        }
        obj.scope = state.line.scope;
        Ok(())
    }

    fn process_directive(
        &self, ctx: &mut CompilationContext, directive: Directive, line: &LineId, state: &mut FileState,
        search_dirs: &[PathBuf], lines: &mut Vec<LineObject>,
    ) -> Result<(), Error> {
        match directive {
            Directive::Condition(condition) => state.conditions.process(condition, &ctx.preprocessor)?,
            Directive::Include(name) => {
                if state.conditions.is_muted() {
                    ctx.warn(Some(line), "#include does not inherit #mute; included file will emit bytecode")?;
                }
                let found = self.locate_include(&name, &state.path, search_dirs, line)?;
                if ctx.files.contains(&found) {
                    return Err(include_err(
                        line,
                        format!("assembly file {} included multiple times", found.display()),
                    ));
                }
                let defined = self.load_file(ctx, &found, search_dirs, Some(line), lines)?;
                state.defined_scopes.extend(defined);
            }
            Directive::Define { name, value } => ctx.preprocessor.create_symbol(&name, value.as_deref(), line)?,
            Directive::Mute => state.conditions.mute(),
            Directive::Unmute => {
                if !state.conditions.unmute() {
                    ctx.warn(Some(line), "#unmute without a matching #mute")?;
                }
            }
            Directive::Error(msg) => {
                return Err(Error::new(
                    ErrorKind::Preprocessor,
                    Some(line),
                    msg.as_deref().unwrap_or("#error directive encountered"),
                ));
            }
            Directive::Print { level, color, message } => {
                if !state.conditions.is_muted() && ctx.options.verbosity >= level {
                    match color {
                        Some(c) => println!("{}", c.paint(&message)),
                        None => println!("{}", message),
                    }
                }
            }
            Directive::Require(requirement) => ctx.preprocessor.check_required_language(&requirement, line)?,
            Directive::CreateMemzone { name, start, end } => {
                ctx.zones.create_zone(start, end, &name, Some(line))?;
            }
            Directive::CreateScope { name, prefix } => {
                ctx.named_scopes.create_scope(&name, &prefix, line)?;
                state.line.named_scopes.activate(&name);
                state.defined_scopes.insert(name);
            }
            Directive::UseScope(name) => {
                if state.line.named_scopes.first() == Some(name.as_str()) {
                    ctx.warn(
                        Some(line),
                        &format!("Named scope {} is already active; #use-scope has no effect", name),
                    )?;
                }
                state.line.named_scopes.activate(&name);
                state.used_scopes.push((name, line.clone()));
            }
            Directive::DeactivateScope(name) => {
                if !state.line.named_scopes.contains(&name) {
                    ctx.warn(
                        Some(line),
                        &format!("Named scope {} is not active; #deactivate-scope has no effect", name),
                    )?;
                }
                state.line.named_scopes.deactivate(&name);
            }
        }
        Ok(())
    }

    /// Find an include file in the including file's directory or the search directories.
    fn locate_include(
        &self, name: &str, including: &Path, search_dirs: &[PathBuf], line: &LineId,
    ) -> Result<PathBuf, Error> {
        let own_dir = including.parent().map(Path::to_path_buf).into_iter();
        let mut checked: Vec<PathBuf> = Vec::new();
        let mut found: Vec<PathBuf> = Vec::new();
        for dir in own_dir.chain(search_dirs.iter().cloned()) {
            let dir = canonical(&dir);
            if checked.contains(&dir) {
                continue;
            }
            let candidate = dir.join(name);
            if candidate.is_file() {
                let candidate = canonical(&candidate);
                if !found.contains(&candidate) {
                    found.push(candidate);
                }
            }
            checked.push(dir);
        }
        match found.len() {
            0 => Err(include_err(line, format!("could not find included file \"{}\"", name))),
            1 => Ok(found.remove(0)),
            _ => Err(include_err(
                line,
                format!(
                    "included file \"{}\" is ambiguous; found in: {}",
                    name,
                    found.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", ")
                ),
            )),
        }
    }

    /// Pass 1: place every compilable object and give address labels their values.
    fn assign_addresses(&self, ctx: &mut CompilationContext, lines: &mut [LineObject]) -> Result<(), Error> {
        for line in lines.iter_mut().filter(|l| l.compilable) {
            let cursor = ctx.zones.get(line.zone).current_address();
            let next = line.assign_address(cursor, &ctx.env())?;
            if let Some(target) = line.fill_target_behind(cursor, &ctx.env())? {
                ctx.warn(
                    Some(&line.line_id),
                    &format!(".zerountil target 0x{:x} is below the current address 0x{:x}", target, cursor),
                )?;
            }
            ctx.zones
                .get_mut(line.zone)
                .set_current_address(next)
                .map_err(|e| e.at(&line.line_id))?;
            if let (Some(label), Some(address)) = (line.address_label(), line.address) {
                let label = label.to_string();
                ctx.bind_label(line.scope, &line.named_scopes, &label, address, &line.line_id)?;
            }
        }
        Ok(())
    }

    /// Pass 2: generate words in address order and reject overlapping objects.
    fn generate_words(&self, ctx: &mut CompilationContext, lines: &mut [LineObject]) -> Result<(), Error> {
        let mut warnings = Vec::new();
        for line in lines.iter_mut() {
            line.generate_words(&ctx.env(), &mut warnings)?;
            for msg in warnings.drain(..) {
                ctx.warn(Some(&line.line_id), &msg)?;
            }
        }
        let mut previous: Option<(i128, &LineId)> = None;
        for line in lines.iter().filter(|l| l.produces_words()) {
            let address = line.address.unwrap_or_default();
            if let Some((end, other)) = previous {
                if end > address {
                    return Err(Error::new(
                        ErrorKind::Overlap,
                        Some(&line.line_id),
                        &format!(
                            "Address of byte code at this line overlaps with bytecode from line {} at address 0x{:x}",
                            other, address
                        ),
                    ));
                }
            }
            previous = Some((address + line.word_count() as i128, &line.line_id));
        }
        Ok(())
    }

    /// Lay the unmuted words out from the start address through the end address.
    fn emit(&self, ctx: &CompilationContext, lines: &[LineObject]) -> Result<(i128, Vec<u8>), Error> {
        let start = ctx.options.start.map_or(0, |s| s as i128);
        let last = lines
            .iter()
            .filter(|l| l.produces_words())
            .map(|l| l.address.unwrap_or_default() + l.word_count() as i128 - 1)
            .max();
        let end = match (ctx.options.end, last) {
            (Some(end), _) => end as i128,
            (None, Some(last)) => last,
            (None, None) => return Ok((start, Vec::new())),
        };
        let by_address: HashMap<i128, &LineObject> = lines
            .iter()
            .filter(|l| l.produces_words() && !l.muted)
            .map(|l| (l.address.unwrap_or_default(), l))
            .collect();
        let fill = Word::new(
            ctx.options.fill as u128 & low_mask(self.model.word_size),
            self.model.word_size,
            self.model.segment_size,
            self.model.intra_word_endian,
        )?;
        let mut words = Vec::new();
        let mut address = start;
        while address <= end {
            match by_address.get(&address) {
                Some(line) => {
                    words.extend_from_slice(line.words());
                    address += line.word_count() as i128;
                }
                None => {
                    words.push(fill);
                    address += 1;
                }
            }
        }
        Ok((start, words_to_bytes(&words, true)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TEST_ISA;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static DIR_COUNT: AtomicUsize = AtomicUsize::new(0);

    /// A fresh directory holding the given source files.
    fn source_dir(files: &[(&str, &str)]) -> Result<PathBuf, Error> {
        let dir = std::env::temp_dir().join(format!(
            "bespokeasm-test-{}-{}",
            std::process::id(),
            DIR_COUNT.fetch_add(1, Ordering::SeqCst)
        ));
        fs::create_dir_all(&dir)?;
        for (name, text) in files {
            let path = dir.join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, text)?;
        }
        Ok(dir)
    }
    fn assemble_with(files: &[(&str, &str)], options: AssemblerOptions) -> Result<Program, Error> {
        let dir = source_dir(files)?;
        let model = AsmModel::from_yaml_str(TEST_ISA, "test")?;
        let result = Assembler::new(&model)?.assemble_file(&dir.join(files[0].0), options);
        let _ = fs::remove_dir_all(&dir);
        result
    }
    fn assemble(files: &[(&str, &str)]) -> Result<Program, Error> { assemble_with(files, AssemblerOptions::default()) }
    fn kind_of(result: Result<Program, Error>) -> Option<ErrorKind> { result.err().map(|e| e.kind) }

    #[test]
    fn simple_program() -> Result<(), Error> {
        let program = assemble(&[(
            "main.asm",
            "nop\nthe_byte: .byte 0x88\nthe_instr: mov a, [the_byte] ; load it\n",
        )])?;
        assert_eq!(program.image, vec![0x00, 0x88, 0x46, 0x01, 0x00]);
        assert_eq!(program.start, 0);
        assert!(program.warnings.is_empty());
        Ok(())
    }
    #[test]
    fn forward_references_and_gaps() -> Result<(), Error> {
        let src = "jmp end\n.org 6\nend: hlt\n";
        let program = assemble_with(
            &[("main.asm", src)],
            AssemblerOptions {
                fill: 0xee,
                ..Default::default()
            },
        )?;
        assert_eq!(program.image, vec![0xc3, 0x06, 0x00, 0xee, 0xee, 0xee, 0xff]);
        Ok(())
    }
    #[test]
    fn start_and_end_trim_the_image() -> Result<(), Error> {
        let program = assemble_with(
            &[("main.asm", "nop\nhlt\nnop\n")],
            AssemblerOptions {
                start: Some(1),
                end: Some(3),
                ..Default::default()
            },
        )?;
        assert_eq!(program.image, vec![0xff, 0x00, 0x00]);
        Ok(())
    }
    #[test]
    fn local_labels_repeat_under_different_parents() -> Result<(), Error> {
        let src = "first: nop\n.here: jmp shared\nsecond: nop\n.here: jmp shared\nshared: hlt\n";
        let program = assemble(&[("main.asm", src)])?;
        assert_eq!(program.image, vec![0x00, 0xc3, 0x08, 0x00, 0x00, 0xc3, 0x08, 0x00, 0xff]);
        assert_eq!(kind_of(assemble(&[("main.asm", "a1: nop\n.x: nop\n.x: nop\n")])), Some(ErrorKind::Label));
        Ok(())
    }
    #[test]
    fn overlapping_code_is_rejected() {
        let src = "nop\nnop\n.org 1\nhlt\n";
        assert_eq!(kind_of(assemble(&[("main.asm", src)])), Some(ErrorKind::Overlap));
    }
    #[test]
    fn muted_code_is_placed_but_not_emitted() -> Result<(), Error> {
        let program = assemble(&[("main.asm", "nop\n#mute\nhidden: hlt\n#unmute\njmp hidden\n")])?;
        assert_eq!(program.image, vec![0x00, 0x00, 0xc3, 0x01, 0x00]);
        Ok(())
    }
    #[test]
    fn conditions_skip_lines_and_includes() -> Result<(), Error> {
        let src = "#define FAST 1\n\
                   #if FAST == 0\n\
                   #include \"missing.asm\"\n\
                   hlt\n\
                   #elif FAST == 1\n\
                   nop\n\
                   #endif\n\
                   #ifndef FAST\n\
                   hlt\n\
                   #endif\n";
        let program = assemble(&[("main.asm", src)])?;
        assert_eq!(program.image, vec![0x00]);
        assert_eq!(
            kind_of(assemble(&[("main.asm", "#if 1 == 1\nnop\n")])),
            Some(ErrorKind::Preprocessor)
        );
        Ok(())
    }
    #[test]
    fn includes_are_found_once() -> Result<(), Error> {
        let program = assemble(&[
            ("main.asm", "#include \"lib.asm\"\njmp routine\n"),
            ("lib.asm", "routine: hlt\n"),
        ])?;
        assert_eq!(program.image, vec![0xff, 0xc3, 0x00, 0x00]);
        let twice = assemble(&[
            ("main.asm", "#include \"lib.asm\"\n#include \"lib.asm\"\n"),
            ("lib.asm", "nop\n"),
        ]);
        assert_eq!(kind_of(twice), Some(ErrorKind::Include));
        assert_eq!(kind_of(assemble(&[("main.asm", "#include \"nope.asm\"\n")])), Some(ErrorKind::Include));
        Ok(())
    }
    #[test]
    fn circular_includes_are_rejected() -> Result<(), Error> {
        let files = [
            ("main.asm", "#include \"lib.asm\"\nnop\n"),
            ("lib.asm", "#include \"main.asm\"\nhlt\n"),
        ];
        assert_eq!(kind_of(assemble(&files)), Some(ErrorKind::Include));
        // the root file given through a non-canonical path
        let dir = source_dir(&files)?;
        let relative = dir.join("..").join(dir.file_name().unwrap_or_default()).join("main.asm");
        let model = AsmModel::from_yaml_str(TEST_ISA, "test")?;
        let result = Assembler::new(&model)?.assemble_file(&relative, AssemblerOptions::default());
        let _ = fs::remove_dir_all(&dir);
        assert_eq!(kind_of(result), Some(ErrorKind::Include));
        Ok(())
    }
    #[test]
    fn include_paths_are_searched() -> Result<(), Error> {
        let dir = source_dir(&[("lib/util.asm", "hlt\n")])?;
        let program = assemble_with(
            &[("main.asm", "#include \"util.asm\"\n")],
            AssemblerOptions {
                include_paths: vec![dir.join("lib")],
                ..Default::default()
            },
        );
        let _ = fs::remove_dir_all(&dir);
        assert_eq!(program?.image, vec![0xff]);
        Ok(())
    }
    #[test]
    fn named_scopes_isolate_library_labels() -> Result<(), Error> {
        let lib = "#create-scope \"math\" prefix=\"m_\"\nm_start: nop\nhelper: hlt\n#deactivate-scope \"math\"\n";
        let main = "#include \"math.asm\"\n#use-scope \"math\"\njmp m_start\njmp helper\n";
        let program = assemble(&[("main.asm", main), ("math.asm", lib)])?;
        assert_eq!(program.image, vec![0x00, 0xff, 0xc3, 0x00, 0x00, 0xc3, 0x01, 0x00]);
        // without #use-scope the prefixed label stays private to the library
        let hidden = "#include \"math.asm\"\njmp m_start\n";
        assert_eq!(kind_of(assemble(&[("main.asm", hidden), ("math.asm", lib)])), Some(ErrorKind::Label));
        Ok(())
    }
    #[test]
    fn redundant_scope_directives_warn() -> Result<(), Error> {
        let src = "#create-scope \"s\"\n#use-scope \"s\"\n#deactivate-scope \"s\"\n#deactivate-scope \"s\"\nnop\n";
        let program = assemble(&[("main.asm", src)])?;
        assert_eq!(program.warnings.len(), 2);
        let strict = assemble_with(
            &[("main.asm", src)],
            AssemblerOptions {
                warnings_as_errors: true,
                ..Default::default()
            },
        );
        assert_eq!(kind_of(strict), Some(ErrorKind::Warning));
        Ok(())
    }
    #[test]
    fn memory_zones_place_code() -> Result<(), Error> {
        let src = "#create_memzone data $0008 $000f\n\
                   nop\n\
                   .memzone data\n\
                   value: .byte 7\n\
                   .memzone GLOBAL\n\
                   jmp value\n\
                   .org 2 \"data\"\n\
                   .byte 9\n";
        let program = assemble(&[("main.asm", src)])?;
        assert_eq!(
            program.image,
            vec![0x00, 0xc3, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x07, 0x00, 0x09]
        );
        Ok(())
    }
    #[test]
    fn zerountil_behind_the_cursor_warns() -> Result<(), Error> {
        let program = assemble(&[("main.asm", "nop\nnop\nnop\n.zerountil 1\nhlt\n")])?;
        assert_eq!(program.image, vec![0x00, 0x00, 0x00, 0xff]);
        assert_eq!(program.warnings.len(), 1);
        assert!(program.warnings[0].contains(".zerountil target 0x1"));
        let reached = assemble(&[("main.asm", "nop\nnop\n.zerountil 1\nhlt\n")])?;
        assert!(reached.warnings.is_empty());
        Ok(())
    }
    #[test]
    fn global_zone_can_be_narrowed() -> Result<(), Error> {
        let isa = TEST_ISA.replace(
            "predefined:\n",
            "predefined:\n  memory_zones:\n    - {name: GLOBAL, start: 0, end: 0x7fff}\n",
        );
        let model = AsmModel::from_yaml_str(&isa, "test")?;
        let asm = Assembler::new(&model)?;
        let dir = source_dir(&[("main.asm", "jmp done\ndone: hlt\n"), ("far.asm", ".org $8000\nnop\n")])?;
        let program = asm.assemble_file(&dir.join("main.asm"), AssemblerOptions::default());
        let far = asm.assemble_file(&dir.join("far.asm"), AssemblerOptions::default());
        let _ = fs::remove_dir_all(&dir);
        assert_eq!(program?.image, vec![0xc3, 0x03, 0x00, 0xff]);
        assert_eq!(kind_of(far), Some(ErrorKind::Range));
        Ok(())
    }
    #[test]
    fn predefined_data_blocks() -> Result<(), Error> {
        let isa = TEST_ISA.replace(
            "predefined:\n",
            "predefined:\n  data:\n    - {name: vectors, address: 4, value: 0x1ea, size: 2}\n",
        );
        let model = AsmModel::from_yaml_str(&isa, "test")?;
        let dir = source_dir(&[("main.asm", "jmp vectors\n")])?;
        let program = Assembler::new(&model)?.assemble_file(&dir.join("main.asm"), AssemblerOptions::default());
        let _ = fs::remove_dir_all(&dir);
        assert_eq!(program?.image, vec![0xc3, 0x04, 0x00, 0x00, 0xea, 0xea]);
        Ok(())
    }
    #[test]
    fn missing_source_and_error_directive() {
        let model = AsmModel::from_yaml_str(TEST_ISA, "test");
        if let Ok(model) = model {
            if let Ok(asm) = Assembler::new(&model) {
                let missing = asm.assemble_file(Path::new("/no/such/file.asm"), AssemblerOptions::default());
                assert_eq!(kind_of(missing), Some(ErrorKind::IO));
            }
        }
        let err = assemble(&[("main.asm", "#error \"stop here\"\n")]).err();
        assert_eq!(err.as_ref().map(|e| e.kind), Some(ErrorKind::Preprocessor));
        assert_eq!(err.map(|e| e.msg), Some("stop here".to_string()));
    }
}
