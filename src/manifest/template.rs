use regex::{Captures, Regex};
use std::sync::LazyLock;

/// Placeholders a build or run template may use.
pub const TEMPLATE_VARIABLES: &[&str] = &["source", "artifact", "id", "cwe", "workdir"];

// A leading `$` marks a shell expansion (`${HOME}`), which is left for the shell.
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$?\{([A-Za-z_][A-Za-z0-9_-]*)\}").expect("placeholder pattern is valid")
});

/// Values substituted into templates for one execution.
#[derive(Debug, Clone)]
pub struct TemplateContext<'a> {
    pub source: &'a str,
    pub artifact: &'a str,
    pub id: &'a str,
    pub cwe: &'a str,
    pub workdir: &'a str,
}

impl TemplateContext<'_> {
    fn lookup(&self, name: &str) -> Option<&str> {
        match name {
            "source" => Some(self.source),
            "artifact" => Some(self.artifact),
            "id" => Some(self.id),
            "cwe" => Some(self.cwe),
            "workdir" => Some(self.workdir),
            _ => None,
        }
    }
}

pub fn resolve_template(template: &str, context: &TemplateContext<'_>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            let whole = &caps[0];
            if whole.starts_with('$') {
                return whole.to_string();
            }
            match context.lookup(&caps[1]) {
                Some(value) => value.to_string(),
                None => whole.to_string(),
            }
        })
        .into_owned()
}

/// Placeholder names that no context can resolve, in order of first appearance.
pub fn unresolved_variables(template: &str) -> Vec<String> {
    let mut unknown: Vec<String> = Vec::new();
    for caps in PLACEHOLDER.captures_iter(template) {
        if caps[0].starts_with('$') {
            continue;
        }
        let name = &caps[1];
        if !TEMPLATE_VARIABLES.contains(&name) && !unknown.iter().any(|u| u == name) {
            unknown.push(name.to_string());
        }
    }
    unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> TemplateContext<'static> {
        TemplateContext {
            source: "overflow.c",
            artifact: "overflow",
            id: "cwe121-stack",
            cwe: "CWE-121",
            workdir: "/tmp/cwe-harness-1-abc",
        }
    }

    #[test]
    fn test_resolve_build_command() {
        let cmd = resolve_template("cc -O0 -o {artifact} {source}", &context());
        assert_eq!(cmd, "cc -O0 -o overflow overflow.c");
    }

    #[test]
    fn test_resolve_all_variables() {
        let cmd = resolve_template("{id} {cwe} {workdir}/{artifact}", &context());
        assert_eq!(cmd, "cwe121-stack CWE-121 /tmp/cwe-harness-1-abc/overflow");
    }

    #[test]
    fn test_shell_expansion_left_alone() {
        let cmd = resolve_template("echo ${HOME} {artifact}", &context());
        assert_eq!(cmd, "echo ${HOME} overflow");
        assert!(unresolved_variables("echo ${HOME} ${source}").is_empty());
    }

    #[test]
    fn test_unresolved_variables_reported_once() {
        assert_eq!(
            unresolved_variables("cc {cflags} -o {artifact} {src} {cflags}"),
            vec!["cflags", "src"]
        );
        assert!(unresolved_variables("cc -o {artifact} {source}").is_empty());
    }

    #[test]
    fn test_braces_that_are_not_placeholders() {
        assert!(unresolved_variables("awk '{ print $1 }'").is_empty());
        assert_eq!(resolve_template("awk '{ print $1 }'", &context()), "awk '{ print $1 }'");
    }
}
