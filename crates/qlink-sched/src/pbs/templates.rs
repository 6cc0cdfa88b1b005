//! PBS batch script templates.

use crate::job::JobDescription;
use crate::pbs::discovery::ClusterProfile;

/// Interpreter line of every generated script.
pub const SHEBANG: &str = "#!/bin/bash";

/// Render a job description as a PBS submission script.
///
/// The output is a pure function of its inputs: the shebang, one `#PBS`
/// directive per field that is set (plus the unconditional `-V`), and the
/// command line. Arguments are joined with single spaces without quoting;
/// callers escape embedded whitespace themselves.
pub fn compile_script(jd: &JobDescription, profile: &ClusterProfile) -> String {
    let mut script = String::new();

    script.push_str(SHEBANG);
    script.push('\n');

    for directive in directives(jd, profile) {
        script.push_str("#PBS ");
        script.push_str(&directive);
        script.push('\n');
    }

    script.push_str(&command_line(jd));
    script.push('\n');

    script
}

/// Directive arguments, without the `#PBS ` prefix, in script order.
fn directives(jd: &JobDescription, profile: &ClusterProfile) -> Vec<String> {
    let mut out = Vec::new();

    if let Some(ref name) = jd.name {
        out.push(format!("-N {name}"));
    }

    // Export the submission environment
    out.push("-V".to_string());

    if !jd.environment.is_empty() {
        out.push(format!("-v {}", environment_list(jd)));
    }
    if let Some(ref dir) = jd.working_directory {
        out.push(format!("-d {}", dir.display()));
    }
    if let Some(ref output) = jd.output {
        out.push(format!("-o {}", output.display()));
    }
    if let Some(ref error) = jd.error {
        out.push(format!("-e {}", error.display()));
    }
    if let Some(minutes) = jd.wall_time_limit {
        out.push(format!("-l walltime={}", format_walltime(minutes)));
    }
    if let Some(ref queue) = jd.queue {
        out.push(format!("-q {queue}"));
    }
    if let Some(ref project) = jd.project {
        out.push(format!("-A {project}"));
    }
    match jd.notify {
        Some(true) => out.push("-m abe".to_string()),
        Some(false) => out.push("-m n".to_string()),
        None => {}
    }
    if let Some(cpus) = jd.total_cpu_count {
        out.push(resource_request(cpus, profile));
    }

    out
}

/// `KEY=VALUE` pairs joined by commas, in the description's order.
fn environment_list(jd: &JobDescription) -> String {
    jd.environment
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Format a limit in minutes as `HH:MM:00`.
pub fn format_walltime(minutes: u32) -> String {
    format!("{:02}:{:02}:00", minutes / 60, minutes % 60)
}

/// Number of nodes needed for `cpus` at `cores_per_node` each.
pub fn node_count(cpus: u32, cores_per_node: u32) -> u32 {
    cpus.div_ceil(cores_per_node.max(1))
}

/// The `-l` resource request for `cpus` CPUs.
///
/// Torque on Cray XT machines takes a plain core count (`size=`); regular
/// clusters get whole nodes at the discovered cores per node.
pub fn resource_request(cpus: u32, profile: &ClusterProfile) -> String {
    if profile.is_cray {
        format!("-l size={cpus}")
    } else {
        let ppn = profile.cores_per_node;
        format!("-l nodes={}:ppn={}", node_count(cpus, ppn), ppn)
    }
}

fn command_line(jd: &JobDescription) -> String {
    let mut line = jd.executable.clone();
    for arg in &jd.arguments {
        line.push(' ');
        line.push_str(arg);
    }
    line
}
