//! Submission script synthesis
//!
//! Renders a PBS-style submission script from a [`JobTemplate`] and the
//! attempt's paths. Resource selection, queue, walltime, and mounts all come
//! from configuration; nothing here is hard-coded to one cluster.

use std::path::Path;

use crate::config::JobTemplate;

/// Everything the rendered script needs to know about one attempt
#[derive(Debug, Clone)]
pub struct ScriptContext<'a> {
    pub job_name: &'a str,
    pub interpreter: &'a str,
    pub payload_path: &'a Path,
    pub workdir: &'a Path,
    pub stdout_path: &'a Path,
    pub stderr_path: &'a Path,
}

/// Render the full submission script for one execution attempt
pub fn render_job_script(template: &JobTemplate, ctx: &ScriptContext<'_>) -> String {
    let mut directives = vec!["#!/bin/bash".to_string()];
    directives.push(format!("#PBS -N {}", ctx.job_name));
    if let Some(account) = &template.account {
        directives.push(format!("#PBS -A {}", account));
    }
    if let Some(select) = &template.select {
        directives.push(format!("#PBS -l select={}", select));
    }
    if let Some(filesystems) = &template.filesystems {
        directives.push(format!("#PBS -l filesystems={}", filesystems));
    }
    if let Some(walltime) = &template.walltime {
        directives.push(format!("#PBS -l walltime={}", walltime));
    }
    if let Some(queue) = &template.queue {
        directives.push(format!("#PBS -q {}", queue));
    }
    directives.push(format!("#PBS -o {}", ctx.stdout_path.display()));
    directives.push(format!("#PBS -e {}", ctx.stderr_path.display()));

    let mut body = vec![
        "set -euo pipefail".to_string(),
        format!("cd {}", ctx.workdir.display()),
    ];
    for module in &template.modules {
        body.push(format!("module load {}", module));
    }
    for command in &template.pre_run_commands {
        body.push(command.clone());
    }
    body.push(format!("{} {}", ctx.interpreter, ctx.payload_path.display()));

    format!("{}\n\n{}\n", directives.join("\n"), body.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn ctx<'a>(
        payload: &'a PathBuf,
        workdir: &'a PathBuf,
        out: &'a PathBuf,
        err: &'a PathBuf,
    ) -> ScriptContext<'a> {
        ScriptContext {
            job_name: "agentlab_a1b2_i01_a01",
            interpreter: "python3",
            payload_path: payload,
            workdir,
            stdout_path: out,
            stderr_path: err,
        }
    }

    #[test]
    fn test_render_minimal_template() {
        let template = JobTemplate::default();
        let payload = PathBuf::from("/runs/x/iteration_01/code_rev_01.py");
        let workdir = PathBuf::from("/runs/x/iteration_01");
        let out = PathBuf::from("/runs/x/iteration_01/attempt_01.out");
        let err = PathBuf::from("/runs/x/iteration_01/attempt_01.err");

        let script = render_job_script(&template, &ctx(&payload, &workdir, &out, &err));

        assert!(script.starts_with("#!/bin/bash\n"));
        assert!(script.contains("#PBS -N agentlab_a1b2_i01_a01"));
        assert!(script.contains("#PBS -l select=1"));
        assert!(script.contains("#PBS -l walltime=01:00:00"));
        assert!(script.contains("#PBS -o /runs/x/iteration_01/attempt_01.out"));
        assert!(script.contains("#PBS -e /runs/x/iteration_01/attempt_01.err"));
        assert!(script.contains("set -euo pipefail"));
        assert!(script.contains("cd /runs/x/iteration_01"));
        assert!(script.contains("python3 /runs/x/iteration_01/code_rev_01.py"));
        // No account/queue directives unless supplied
        assert!(!script.contains("#PBS -A"));
        assert!(!script.contains("#PBS -q"));
    }

    #[test]
    fn test_render_full_template() {
        let template = JobTemplate {
            account: Some("ChemLab".into()),
            select: Some("1:system=sophia".into()),
            filesystems: Some("home:grand".into()),
            walltime: Some("02:30:00".into()),
            queue: Some("by-gpu".into()),
            modules: vec!["conda".into(), "cuda/12.2".into()],
            pre_run_commands: vec!["conda activate lab".into()],
        };
        let payload = PathBuf::from("/w/code.py");
        let workdir = PathBuf::from("/w");
        let out = PathBuf::from("/w/a.out");
        let err = PathBuf::from("/w/a.err");

        let script = render_job_script(&template, &ctx(&payload, &workdir, &out, &err));

        assert!(script.contains("#PBS -A ChemLab"));
        assert!(script.contains("#PBS -l select=1:system=sophia"));
        assert!(script.contains("#PBS -l filesystems=home:grand"));
        assert!(script.contains("#PBS -q by-gpu"));
        assert!(script.contains("module load conda"));
        assert!(script.contains("module load cuda/12.2"));
        assert!(script.contains("conda activate lab"));

        // Directives come before the body
        let directive_pos = script.find("#PBS -q").unwrap();
        let body_pos = script.find("set -euo pipefail").unwrap();
        assert!(directive_pos < body_pos);
    }
}
