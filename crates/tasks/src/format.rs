//! Template rendering for emitted tasks and acknowledgements.

use {chrono::SecondsFormat, taskbridge_queue::Task};

/// Fill `{id}`, `{category}`, `{source_id}`, `{body}` and `{created_at}` in
/// `template`. Unknown placeholders are left as they are. The task body is
/// substituted last so braces inside it are never expanded.
#[must_use]
pub fn render(template: &str, task: &Task) -> String {
    let category = task.category.map_or("uncategorized", |c| c.as_str());
    let created_at = task.created_at.to_rfc3339_opts(SecondsFormat::Secs, true);

    let mut out = String::with_capacity(template.len() + task.body.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start..];
        let Some(end) = after.find('}') else {
            out.push_str(after);
            return out;
        };
        let value = match &after[1..end] {
            "id" => Some(task.id.to_string()),
            "category" => Some(category.to_string()),
            "source_id" => Some(task.source_id.clone()),
            "body" => Some(task.body.clone()),
            "created_at" => Some(created_at.clone()),
            _ => None,
        };
        match value {
            Some(v) => out.push_str(&v),
            None => out.push_str(&after[..=end]),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}
