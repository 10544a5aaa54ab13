//! Rule-based playbook fixes, applied when no provider is available.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::{Mapping, Value};

// `key:value` on a mapping line. Keys must start with a letter or `_`, so
// `8080:80` port pairs and `http://` URLs are left alone.
static MISSING_SPACE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^([ ]*(?:-[ ]*)?[A-Za-z_][\w.-]*):([^\s/:])").expect("valid key pattern")
});
static EXTRA_SPACE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^([ ]*(?:-[ ]*)?[A-Za-z_][\w.-]*):[ ]{2,}").expect("valid key pattern")
});
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid pattern"));

/// Re-indents every line to an even number of spaces (rounding down) and
/// trims surrounding whitespace.
pub fn fix_indentation(text: &str) -> String {
    text.split('\n')
        .map(|line| {
            let leading = line.chars().take_while(|c| c.is_whitespace()).count();
            format!("{}{}", " ".repeat(leading / 2 * 2), line.trim())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Tabs to two spaces, exactly one space after a mapping key's colon, no
/// trailing whitespace.
pub fn fix_common_syntax(text: &str) -> String {
    let text = text.replace('\t', "  ");
    let text = MISSING_SPACE.replace_all(&text, "$1: $2");
    let text = EXTRA_SPACE.replace_all(&text, "$1: ");
    text.split('\n')
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

/// `register` name for a task: whitespace runs become `_`.
pub fn register_name(task_name: &str) -> String {
    format!("{}_result", WHITESPACE_RUN.replace_all(task_name, "_"))
}

/// Calls `edit` on every top-level task of every play, with the task's
/// name (or `task_<index>` when unnamed).
fn for_each_task(document: &mut Value, mut edit: impl FnMut(&mut Mapping, &str)) {
    let Some(plays) = document.as_sequence_mut() else {
        return;
    };
    for play in plays.iter_mut() {
        let Some(tasks) = play.get_mut("tasks").and_then(Value::as_sequence_mut) else {
            continue;
        };
        for (index, task) in tasks.iter_mut().enumerate() {
            let Some(task) = task.as_mapping_mut() else {
                continue;
            };
            let name = task
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("task_{}", index));
            edit(task, &name);
        }
    }
}

fn set(task: &mut Mapping, key: &str, value: Value) {
    task.insert(Value::String(key.to_string()), value);
}

pub fn add_error_handling(document: &mut Value) {
    for_each_task(document, |task, name| {
        set(task, "ignore_errors", Value::Bool(false));
        set(task, "failed_when", Value::Bool(false));
        set(task, "register", Value::String(register_name(name)));
    });
}

pub fn make_idempotent(document: &mut Value) {
    for_each_task(document, |task, _| {
        set(task, "changed_when", Value::Bool(false));
        set(task, "check_mode", Value::Bool(true));
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indentation_rounds_down_to_even() {
        assert_eq!(
            fix_indentation("- hosts: all\n   tasks:\n     - name: x  \n"),
            "- hosts: all\n  tasks:\n    - name: x\n"
        );
    }

    #[test]
    fn syntax_fix_spaces_colons_and_strips_tabs() {
        let input = "- hosts:all\n\ttasks:\n    - name:   ping  \n      ports:\n        - 8080:80\n      url: http://x\n";
        assert_eq!(
            fix_common_syntax(input),
            "- hosts: all\n  tasks:\n    - name: ping\n      ports:\n        - 8080:80\n      url: http://x\n"
        );
    }

    #[test]
    fn register_name_collapses_whitespace() {
        assert_eq!(register_name("Install  nginx\tnow"), "Install_nginx_now_result");
    }

    #[test]
    fn error_handling_touches_tasks_of_every_play() {
        let mut doc: Value = serde_yaml::from_str(
            "- hosts: web\n  tasks:\n    - name: Install nginx\n      package: {name: nginx}\n    - debug: {msg: hi}\n- hosts: db\n  tasks:\n    - name: Ping\n      ping: {}\n",
        )
        .unwrap();
        add_error_handling(&mut doc);

        assert_eq!(doc[0]["tasks"][0]["register"], "Install_nginx_result");
        assert_eq!(doc[0]["tasks"][0]["ignore_errors"], false);
        assert_eq!(doc[0]["tasks"][1]["register"], "task_1_result");
        assert_eq!(doc[1]["tasks"][0]["failed_when"], false);
    }

    #[test]
    fn idempotency_rule_sets_check_flags() {
        let mut doc: Value =
            serde_yaml::from_str("- hosts: all\n  tasks:\n    - name: A\n      ping: {}\n").unwrap();
        make_idempotent(&mut doc);
        assert_eq!(doc[0]["tasks"][0]["changed_when"], false);
        assert_eq!(doc[0]["tasks"][0]["check_mode"], true);
    }

    #[test]
    fn non_playbook_documents_are_untouched() {
        let mut doc: Value = serde_yaml::from_str("key: value\n").unwrap();
        let before = doc.clone();
        add_error_handling(&mut doc);
        assert_eq!(doc, before);
    }
}
