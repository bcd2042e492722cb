use std::path::{Component, Path, PathBuf};

/// Check a manifest path field: non-empty, relative, and free of `..` components.
pub fn check_relative_path(raw: &str) -> Result<PathBuf, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("path is empty".into());
    }
    let path = Path::new(trimmed);
    for component in path.components() {
        match component {
            Component::RootDir | Component::Prefix(_) => {
                return Err(format!("`{}` is absolute; paths must be relative", trimmed));
            }
            Component::ParentDir => {
                return Err(format!("`{}` escapes the example directory", trimmed));
            }
            Component::CurDir | Component::Normal(_) => {}
        }
    }
    Ok(path.to_path_buf())
}

/// First word of a template that contains a `..` path component, if any.
pub fn find_traversal(template: &str) -> Option<String> {
    template
        .split(|c: char| c.is_whitespace() || matches!(c, '=' | ':' | ';' | '&' | '|' | '<' | '>'))
        .map(|word| word.trim_matches(|c| matches!(c, '"' | '\'' | '(' | ')' | '`')))
        .find(|word| word.split('/').any(|part| part == ".."))
        .map(String::from)
}

/// First absolute path in a template word, if any. The program of each command
/// may be named by absolute path, and `/dev/` paths are always allowed.
pub fn find_absolute(template: &str, leading_program: bool) -> Option<String> {
    template
        .split(|c: char| matches!(c, ';' | '&' | '|' | '(' | ')' | '`' | '\n'))
        .find_map(|command| absolute_in_command(command, leading_program))
        .map(String::from)
}

fn absolute_in_command(command: &str, leading_program: bool) -> Option<&str> {
    let mut expect_program = leading_program;
    for word in command.split_whitespace().map(trim_quotes) {
        if expect_program && !word.contains('=') {
            expect_program = false;
            continue;
        }
        let found = word
            .split(|c: char| matches!(c, '=' | ':' | '<' | '>'))
            .map(trim_quotes)
            .find(|part| part.starts_with('/') && !part.starts_with("/dev/"));
        if found.is_some() {
            return found;
        }
    }
    None
}

fn trim_quotes(word: &str) -> &str {
    word.trim_matches(|c| matches!(c, '"' | '\''))
}
