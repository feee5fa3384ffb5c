use console::style;

use super::Config;

/// Print the effective configuration to stderr
#[inline]
pub fn show_config(config: &Config, source: &str) {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Target:").bold().yellow());
    eprintln!(
        "  Command: {} {}",
        style(&config.target.interpreter).cyan(),
        style(config.target.script.display()).cyan()
    );
    eprintln!(
        "  Search Path Variable: {}",
        style(&config.target.search_path_var).cyan()
    );
    if let Some(dir) = &config.target.working_dir {
        eprintln!("  Working Directory: {}", style(dir.display()).cyan());
    }

    eprintln!();
    eprintln!("{}", style("Probes:").bold().yellow());
    eprintln!("  Timeout: {}s", style(config.probes.timeout_secs).cyan());
    eprintln!(
        "  Latency Threshold: {}ms",
        style(config.probes.latency_threshold_ms).cyan()
    );
    eprintln!(
        "  Protocol Version: {}",
        style(&config.probes.protocol_version).cyan()
    );
    eprintln!(
        "  Expected Server Name: {}",
        style(&config.probes.expected_server_name).cyan()
    );
    eprintln!(
        "  Client Identity: {}/{}",
        style(&config.probes.client_name).cyan(),
        style(&config.probes.client_version).cyan()
    );

    eprintln!();
    match config.http.endpoint_url() {
        Ok(Some(url)) => eprintln!("  HTTP Wrapper: {}", style(url).cyan()),
        Ok(None) => eprintln!("  HTTP Wrapper: {}", style("not configured (stdio fallback)").dim()),
        Err(e) => eprintln!("  HTTP Wrapper: {} ({})", style("Invalid").red(), e),
    }

    eprintln!();
    eprintln!("Config file: {}", style(source).dim());
}
