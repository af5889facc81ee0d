//! Hull shaders: one GLSL function per phase plus a stitched
//! tessellation-control `main`.
//!
//! The control-point phase runs once per output control point. Fork and join
//! phases compute patch constants; they run on invocation 0 after a
//! `barrier()`, each fork/join instance as one call with `phase_instance`.

use tracing::debug;

use super::emitter::{Emitter, Scope};
use super::writer::GlslWriter;
use super::Reflection;
use crate::error::TranslateError;
use crate::hull::{HullPhase, HullPhases};

/// Generated text of a hull shader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HullText {
    pub glsl: String,
    pub control_point: String,
    pub forks: String,
    pub joins: String,
}

impl Emitter<'_> {
    fn phase_function(&mut self, header: &str, phase: &HullPhase, scope: Scope) -> Result<String, TranslateError> {
        self.scope = scope;
        self.out = GlslWriter::new();
        self.line(format!("{header} {{"));
        self.out.indent();
        self.emit_range(phase.instructions.clone())?;
        self.out.dedent();
        self.line("}");
        Ok(std::mem::take(&mut self.out).finish())
    }

    fn control_point_text(&mut self, phases: &HullPhases) -> Result<String, TranslateError> {
        let mut w = GlslWriter::new();
        match &phases.control_point {
            Some(phase) => {
                let body = self.phase_function("void hs_cp_main()", phase, Scope::ControlPoint)?;
                w.block(&body);
                w.blank();
                w.line("void hs_control_point_phase() {");
                w.indent();
                w.line("hs_cp_main();");
            }
            None => {
                // No control-point phase: outputs pass the input points through.
                w.line("void hs_control_point_phase() {");
                w.indent();
                let regs = self.io.output_regs.min(self.io.input_regs);
                for r in 0..regs {
                    w.line(&format!(
                        "o[{r}] = vicp[gl_InvocationID * {} + {r}];",
                        self.io.input_regs
                    ));
                }
            }
        }
        for l in self.io.store_lines() {
            w.line(l);
        }
        w.dedent();
        w.line("}");
        Ok(w.finish())
    }

    /// Phase functions and their driver, `hs_fork_phases()` or
    /// `hs_join_phases()`. The join driver ends by publishing the patch
    /// constants.
    fn patch_phase_text(&mut self, phases: &[HullPhase], join: bool) -> Result<String, TranslateError> {
        let (kind, scope) = if join { ("join", Scope::Join) } else { ("fork", Scope::Fork) };
        let mut w = GlslWriter::new();
        for (k, phase) in phases.iter().enumerate() {
            let header = format!("void hs_{kind}_phase{k}(int phase_instance)");
            let body = self.phase_function(&header, phase, scope)?;
            w.block(&body);
            w.blank();
        }
        w.line(&format!("void hs_{kind}_phases() {{"));
        w.indent();
        for (k, phase) in phases.iter().enumerate() {
            if phase.instance_count <= 1 {
                w.line(&format!("hs_{kind}_phase{k}(0);"));
            } else {
                w.line(&format!("for (int i = 0; i < {}; i++) {{", phase.instance_count));
                w.indent();
                w.line(&format!("hs_{kind}_phase{k}(i);"));
                w.dedent();
                w.line("}");
            }
        }
        if join {
            for l in self.io.patch_store_lines() {
                w.line(l);
            }
        }
        w.dedent();
        w.line("}");
        Ok(w.finish())
    }

    /// Translates a hull shader into its three phase blocks and the stitched
    /// program.
    pub(crate) fn translate_hull(mut self, phases: &HullPhases) -> Result<(HullText, Reflection), TranslateError> {
        let control_point = self.control_point_text(phases)?;
        let forks = self.patch_phase_text(&phases.forks, false)?;
        let joins = self.patch_phase_text(&phases.joins, true)?;
        self.scope = Scope::Main;
        debug!(
            control_point = phases.control_point.is_some(),
            forks = phases.forks.len(),
            joins = phases.joins.len(),
            "emitted hull shader phases"
        );

        let mut main = GlslWriter::new();
        main.line("void main() {");
        main.indent();
        for l in self.io.load_lines() {
            main.line(l);
        }
        self.res.write_icb_init(&mut main, &self.rules);
        main.line("hs_control_point_phase();");
        main.line("barrier();");
        main.line("if (gl_InvocationID == 0) {");
        main.indent();
        for l in self.io.cp_output_load_lines() {
            main.line(l);
        }
        main.line("hs_fork_phases();");
        main.line("hs_join_phases();");
        main.dedent();
        main.line("}");
        main.dedent();
        main.line("}");

        let mut w = GlslWriter::new();
        let mut decls = GlslWriter::new();
        self.write_declarations(&mut decls)?;
        self.write_preamble(&mut w);
        w.blank();
        w.block(&decls.finish());
        for text in [&control_point, &forks, &joins] {
            w.blank();
            w.block(text);
        }
        w.blank();
        w.block(&main.finish());

        let text = HullText {
            glsl: w.finish(),
            control_point,
            forks,
            joins,
        };
        Ok((text, self.reflection))
    }
}
