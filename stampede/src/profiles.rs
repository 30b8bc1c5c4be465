use std::fmt::Write as _;

use stampede_core::{DEFAULT_PROFILE, ProfileRegistry};

use crate::cli::ProfilesArgs;
use crate::output::describe_shape;
use crate::run::load_registry;
use crate::run_error::RunError;

pub async fn list(args: ProfilesArgs) -> Result<(), RunError> {
    let registry = load_registry(args.profiles.as_deref())
        .await
        .map_err(RunError::InvalidInput)?;
    print!("{}", render(&registry));
    Ok(())
}

fn render(registry: &ProfileRegistry) -> String {
    let mut out = String::new();
    for p in registry.iter() {
        let marker = if p.key == DEFAULT_PROFILE { " (default)" } else { "" };
        writeln!(&mut out, "{}{marker}: {}", p.key, describe_shape(&p.shape)).ok();
        for t in &p.thresholds {
            writeln!(&mut out, "  {}: {}", t.metric, t.expressions.join(", ")).ok();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_builtin_profiles_in_key_order() {
        let out = render(&ProfileRegistry::builtin());
        let keys: Vec<&str> = out
            .lines()
            .filter(|l| !l.starts_with(' '))
            .filter_map(|l| l.split(':').next())
            .collect();
        assert_eq!(keys, ["basic (default)", "stages", "stress"]);
        assert!(out.contains("basic (default): constant 10 VUs for 30s\n"));
        assert!(out.contains("stress: stages [5s->50, 20s->100, 5s->0]\n"));
        assert!(out.contains("  response_time: p(95)<1500\n"));
    }
}
