use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::automations::trigger::TriggerKind;

pub type TemplateVars = BTreeMap<String, String>;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{(\w+(?:\.\w+)*)\}\}").expect("placeholder pattern should compile")
});

/// Substitutes `{{path}}` placeholders from `vars`.
///
/// Unknown paths stay in the output untouched so a typo in a template is
/// visible in the delivered message. Substituted values are never scanned
/// again.
pub fn render(template: &str, vars: &TemplateVars) -> String {
    PLACEHOLDER
        .replace_all(template, |captures: &Captures<'_>| match vars.get(&captures[1]) {
            Some(value) => value.clone(),
            None => captures[0].to_string(),
        })
        .into_owned()
}

/// Placeholders in `template` that `kind` never provides.
pub fn unknown_placeholders(template: &str, kind: TriggerKind) -> Vec<String> {
    let known = kind.placeholders();
    let mut unknown = Vec::new();
    for captures in PLACEHOLDER.captures_iter(template) {
        let path = &captures[1];
        if !known.iter().any(|candidate| *candidate == path)
            && !unknown.iter().any(|seen| seen == path)
        {
            unknown.push(path.to_string());
        }
    }
    unknown
}

pub fn vars<const N: usize>(pairs: [(&str, String); N]) -> TemplateVars {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{render, unknown_placeholders, vars, TemplateVars};
    use crate::automations::trigger::TriggerKind;

    #[test]
    fn render_leaves_unknown_keys_verbatim() {
        let rendered = render(
            "Hi {{x.y}}, bye {{z}}",
            &vars([("x.y", "Ana".to_string())]),
        );
        assert_eq!(rendered, "Hi Ana, bye {{z}}");
    }

    #[test]
    fn render_replaces_every_occurrence() {
        let rendered = render(
            "{{lead.name}} / {{lead.name}}",
            &vars([("lead.name", "Acme".to_string())]),
        );
        assert_eq!(rendered, "Acme / Acme");
    }

    #[test]
    fn render_keeps_malformed_placeholders() {
        let input = "open {{lead.name and {{ lead.company }} and {{lead..x}} and {{}}";
        assert_eq!(
            render(input, &vars([("lead.name", "Acme".to_string())])),
            input
        );
    }

    #[test]
    fn render_does_not_expand_substituted_values() {
        let rendered = render(
            "{{a}}",
            &vars([("a", "{{b}}".to_string()), ("b", "nope".to_string())]),
        );
        assert_eq!(rendered, "{{b}}");
    }

    #[test]
    fn render_with_empty_vars_is_identity() {
        let input = "Prazo: {{lead.deadline}} 🔴";
        assert_eq!(render(input, &TemplateVars::new()), input);
    }

    #[test]
    fn unknown_placeholders_reports_each_typo_once() {
        let unknown = unknown_placeholders(
            "{{lead.nmae}} {{lead.name}} {{lead.nmae}} {{stats.tasks_done}}",
            TriggerKind::DeadlineApproaching,
        );
        assert_eq!(unknown, vec!["lead.nmae", "stats.tasks_done"]);
    }
}
