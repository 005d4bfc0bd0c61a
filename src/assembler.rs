//! Assembler collaborator
//!
//! The patcher never assembles code itself. Patches are handed to an
//! `Assembler` together with the virtual files they `incbin`/`incsrc`; the
//! assembler applies them to the image and reports what it printed.

use indexmap::IndexMap;
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{PatchError, Result};
use crate::rom::Rom;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PatchRequest {
    pub patch_name: String,
    pub source: String,
    /// Files the patch may reference by name without touching the disk
    pub virtual_files: IndexMap<String, Vec<u8>>,
}

impl PatchRequest {
    pub fn new(patch_name: &str, source: String) -> Self {
        PatchRequest {
            patch_name: patch_name.to_string(),
            source,
            virtual_files: IndexMap::new(),
        }
    }

    pub fn with_file(mut self, name: &str, bytes: Vec<u8>) -> Self {
        self.virtual_files.insert(name.to_string(), bytes);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AssemblyResult {
    pub success: bool,
    pub prints: Vec<String>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl AssemblyResult {
    pub fn ok(prints: Vec<String>) -> Self {
        AssemblyResult {
            success: true,
            prints,
            ..Default::default()
        }
    }

    pub fn failed(errors: Vec<String>) -> Self {
        AssemblyResult {
            success: false,
            errors,
            ..Default::default()
        }
    }
}

pub trait Assembler {
    /// Apply `request` to `rom`
    fn apply(&mut self, rom: &mut Rom, request: &PatchRequest) -> AssemblyResult;
}

/// Escape `!` in a path so the assembler does not read it as a define
pub fn escape_defines(path: &str) -> String {
    path.replace('!', "\\!")
}

/// Apply a patch and turn a failed assembly into an error carrying the
/// assembler's diagnostics. Returns the prints on success.
pub fn apply_checked(
    assembler: &mut dyn Assembler,
    rom: &mut Rom,
    request: &PatchRequest,
    show_warnings: bool,
) -> Result<Vec<String>> {
    debug!("Applying patch {}", request.patch_name);
    let result = assembler.apply(rom, request);

    if show_warnings {
        for w in &result.warnings {
            warn!("{}: {}", request.patch_name, w);
        }
    }

    if !result.success {
        return Err(PatchError::AssemblerFailed {
            patch: request.patch_name.clone(),
            diagnostics: result.errors,
        });
    }
    Ok(result.prints)
}

const STAGED_PATCH: &str = "_tmp_patch.asm";
const STAGED_ROM: &str = "_tmp_rom.smc";

/// Runs an external assembler executable. Virtual files and the patch are
/// staged in `work_dir`, the image is written out, patched and read back.
pub struct CommandAssembler {
    program: PathBuf,
    work_dir: PathBuf,
    include_dirs: Vec<PathBuf>,
}

impl CommandAssembler {
    pub fn new(program: &Path, work_dir: &Path) -> Self {
        CommandAssembler {
            program: program.to_path_buf(),
            work_dir: work_dir.to_path_buf(),
            include_dirs: Vec::new(),
        }
    }

    /// Extra directory searched by `incsrc`/`incbin`
    pub fn with_include_dir(mut self, dir: &Path) -> Self {
        self.include_dirs.push(dir.to_path_buf());
        self
    }

    fn run(&self, rom: &mut Rom, request: &PatchRequest) -> Result<AssemblyResult> {
        fs::create_dir_all(&self.work_dir)?;
        for (name, bytes) in &request.virtual_files {
            fs::write(self.work_dir.join(name), bytes)?;
        }
        let patch_path = self.work_dir.join(STAGED_PATCH);
        let rom_path = self.work_dir.join(STAGED_ROM);
        fs::write(&patch_path, &request.source)?;
        rom.save(&rom_path)?;

        let mut command = Command::new(&self.program);
        command.arg("--no-title-check");
        for dir in &self.include_dirs {
            command.arg(format!("-I{}", dir.display()));
        }
        let output = command.arg(&patch_path).arg(&rom_path).output().map_err(|e| {
            PatchError::IOError(format!(
                "Unable to run assembler {}: {}",
                self.program.display(),
                e
            ))
        })?;

        let result = classify_output(
            output.status.success(),
            &String::from_utf8_lossy(&output.stdout),
            &String::from_utf8_lossy(&output.stderr),
        );
        if result.success {
            let bytes = fs::read(&rom_path)?;
            *rom = Rom::from_bytes(rom.name(), bytes)?;
        }
        for path in [&patch_path, &rom_path] {
            fs::remove_file(path).ok();
        }
        Ok(result)
    }
}

impl Assembler for CommandAssembler {
    fn apply(&mut self, rom: &mut Rom, request: &PatchRequest) -> AssemblyResult {
        match self.run(rom, request) {
            Ok(result) => result,
            Err(e) => AssemblyResult::failed(vec![e.to_string()]),
        }
    }
}

/// Split assembler console output: stdout lines are prints, stderr lines are
/// warnings when they say so and errors otherwise
pub fn classify_output(success: bool, stdout: &str, stderr: &str) -> AssemblyResult {
    let (warnings, errors): (Vec<String>, Vec<String>) = stderr
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(str::to_string)
        .partition(|l| l.contains("warning"));
    AssemblyResult {
        success: success && errors.is_empty(),
        prints: stdout
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect(),
        warnings,
        errors,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::rom::tests::blank_rom;
    use test_log::test;

    type Responder = Box<dyn FnMut(&mut Rom, &PatchRequest) -> AssemblyResult>;

    /// Records every request and answers with a scripted closure
    pub(crate) struct ScriptedAssembler {
        pub requests: Vec<PatchRequest>,
        respond: Responder,
    }

    impl ScriptedAssembler {
        pub(crate) fn new(
            respond: impl FnMut(&mut Rom, &PatchRequest) -> AssemblyResult + 'static,
        ) -> Self {
            ScriptedAssembler {
                requests: Vec::new(),
                respond: Box::new(respond),
            }
        }

        pub(crate) fn succeeding() -> Self {
            ScriptedAssembler::new(|_, _| AssemblyResult::ok(Vec::new()))
        }
    }

    impl Assembler for ScriptedAssembler {
        fn apply(&mut self, rom: &mut Rom, request: &PatchRequest) -> AssemblyResult {
            self.requests.push(request.clone());
            (self.respond)(rom, request)
        }
    }

    #[test]
    fn test_escape_defines() {
        assert_eq!(escape_defines("asm/sa1def.asm"), "asm/sa1def.asm");
        assert_eq!(escape_defines("C:/hacks!/sa1def.asm"), "C:/hacks\\!/sa1def.asm");
    }

    #[test]
    fn test_failure_carries_diagnostics() {
        let mut asm = ScriptedAssembler::new(|_, _| {
            AssemblyResult::failed(vec!["error: label not found".to_string()])
        });
        let mut rom = blank_rom(2, false);
        let request = PatchRequest::new("broken.asm", "lda #$00".to_string());

        assert_eq!(
            apply_checked(&mut asm, &mut rom, &request, true),
            Err(PatchError::AssemblerFailed {
                patch: "broken.asm".to_string(),
                diagnostics: vec!["error: label not found".to_string()]
            })
        );
        assert_eq!(asm.requests.len(), 1);
    }

    #[test]
    fn test_success_returns_prints() {
        let mut asm = ScriptedAssembler::new(|rom, _| {
            rom.write(0, &[0xEA]).unwrap();
            AssemblyResult::ok(vec!["MAIN 1A8000".to_string()])
        });
        let mut rom = blank_rom(2, false);
        let request = PatchRequest::new("good.asm", String::new()).with_file("data.bin", vec![1]);

        let prints = apply_checked(&mut asm, &mut rom, &request, false).unwrap();
        assert_eq!(prints, vec!["MAIN 1A8000".to_string()]);
        assert_eq!(rom.at(0).unwrap(), 0xEA);
        assert_eq!(asm.requests[0].virtual_files["data.bin"], vec![1]);
    }

    #[test]
    fn test_classify_output() {
        let result = classify_output(
            true,
            "INIT $1A8000\n\nMAIN $1A8010\n",
            "koopa.asm:12: warning: value truncated\n",
        );
        assert!(result.success);
        assert_eq!(result.prints, vec!["INIT $1A8000", "MAIN $1A8010"]);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.errors.is_empty());

        let result = classify_output(false, "", "koopa.asm:3: error: label not found\n");
        assert!(!result.success);
        assert_eq!(result.errors, vec!["koopa.asm:3: error: label not found"]);
    }

    #[test]
    fn test_missing_program_fails_cleanly() {
        let dir = std::env::temp_dir().join("sprite_patcher_missing_assembler");
        let mut asm = CommandAssembler::new(Path::new("no-such-assembler-binary"), &dir);
        let mut rom = blank_rom(2, false);
        let before = rom.raw().to_vec();

        let result = asm.apply(&mut rom, &PatchRequest::new("x.asm", "nop".to_string()));
        assert!(!result.success);
        assert!(result.errors[0].contains("no-such-assembler-binary"));
        assert_eq!(rom.raw(), before.as_slice());
    }
}
