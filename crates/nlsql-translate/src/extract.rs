//! Best-effort recovery of the SQL an agent ran
//!
//! The agent's final answer is free text, so the SQL is recovered by scanning:
//!
//! 1. the last fenced code block in the final answer,
//! 2. the last fenced code block in a trace step input, newest step first,
//! 3. the newest trace step input holding a keyword statement,
//! 4. a keyword statement in the final answer.
//!
//! Only `run_query` steps that returned rows count as trace steps here; a
//! query the database rejected, or one that was only checked, is not the
//! answer's SQL. When the agent declined ("I don't know") or stopped at the
//! iteration limit, the trace is not consulted at all.
//!
//! A fenced block counts when it is tagged `sql` or untagged and starts with a
//! query keyword. A keyword statement runs from a query keyword to the next
//! blank line; it must look like SQL (`FROM`, `INTO` or `SET` present, or an
//! uppercase keyword at the start of a line) so prose such as "with the data"
//! is skipped. When nothing matches, [`SQL_NOT_RECOVERABLE`] stands in.

use crate::agent::{AgentStep, ITERATION_LIMIT_ANSWER};

pub const SQL_NOT_RECOVERABLE: &str = "SQL not recoverable";

const QUERY_KEYWORDS: [&str; 6] = ["SELECT", "WITH", "INSERT", "UPDATE", "DELETE", "SHOW"];

pub fn extract_sql(output: &str, trace: &[AgentStep]) -> Option<String> {
    if let Some(sql) = fenced_sql_blocks(output).pop() {
        return Some(sql);
    }
    if declined(output) {
        return keyword_statement(output);
    }

    let executed: Vec<&AgentStep> = trace.iter().rev().filter(|step| ran_successfully(step)).collect();
    if let Some(sql) = executed.iter().find_map(|step| fenced_sql_blocks(&step.input).pop()) {
        return Some(sql);
    }
    if let Some(sql) = executed.iter().find_map(|step| keyword_statement(&step.input)) {
        return Some(sql);
    }
    keyword_statement(output)
}

/// SQL text or the placeholder
pub fn recover_sql(output: &str, trace: &[AgentStep]) -> String {
    extract_sql(output, trace).unwrap_or_else(|| SQL_NOT_RECOVERABLE.to_string())
}

/// The agent gave up on the question or ran out of iterations
fn declined(output: &str) -> bool {
    let answer = output.trim();
    if answer == ITERATION_LIMIT_ANSWER {
        return true;
    }
    let lower = answer.to_lowercase().replace('\u{2019}', "'");
    lower.contains("i don't know") || lower.contains("i do not know")
}

fn ran_successfully(step: &AgentStep) -> bool {
    step.tool == "run_query" && !step.output.trim_start().starts_with("Error:")
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Byte offset of the earliest standalone query keyword in a line
fn keyword_position(line: &str) -> Option<usize> {
    let upper = line.to_ascii_uppercase();
    let bytes = upper.as_bytes();

    QUERY_KEYWORDS
        .iter()
        .flat_map(|kw| upper.match_indices(kw).map(move |(pos, _)| (pos, kw.len())))
        .filter(|&(pos, len)| {
            let before_ok = pos == 0 || !is_word_byte(bytes[pos - 1]);
            let after_ok = bytes
                .get(pos + len)
                .map_or(true, |&b| b.is_ascii_whitespace() || b == b'(' || b == b'*');
            before_ok && after_ok
        })
        .map(|(pos, _)| pos)
        .min()
}

fn starts_with_keyword(text: &str) -> bool {
    keyword_position(text.trim_start()) == Some(0)
}

fn fenced_sql_blocks(text: &str) -> Vec<String> {
    text.split("```")
        .enumerate()
        .filter(|(i, _)| i % 2 == 1)
        .filter_map(|(_, part)| {
            let (tag, body) = match part.split_once('\n') {
                Some((first, rest)) => {
                    let first = first.trim();
                    if first.is_empty() {
                        ("", rest)
                    } else if !first.contains(char::is_whitespace) && !starts_with_keyword(first) {
                        (first, rest)
                    } else {
                        ("", part)
                    }
                }
                None => match part.get(..3) {
                    Some(head) if head.eq_ignore_ascii_case("sql") && part[3..].starts_with(char::is_whitespace) => {
                        ("sql", &part[3..])
                    }
                    _ => ("", part),
                },
            };

            let body = body.trim();
            let tagged_sql = tag.eq_ignore_ascii_case("sql");
            let accepted = !body.is_empty() && (tagged_sql || (tag.is_empty() && starts_with_keyword(body)));
            accepted.then(|| body.to_string())
        })
        .collect()
}

fn keyword_statement(text: &str) -> Option<String> {
    let lines: Vec<&str> = text.lines().collect();

    for (idx, line) in lines.iter().enumerate() {
        let Some(pos) = keyword_position(line) else {
            continue;
        };

        let at_line_start = line[..pos].trim().is_empty();
        let mut statement = line[pos..].trim_end().to_string();
        // A statement embedded in prose ends with its line
        if at_line_start {
            for next in &lines[idx + 1..] {
                if next.trim().is_empty() {
                    break;
                }
                statement.push('\n');
                statement.push_str(next.trim_end());
            }
        }

        let upper = statement.to_ascii_uppercase();
        let typed_upper = QUERY_KEYWORDS.iter().any(|kw| line[pos..].starts_with(kw));
        let looks_like_sql = upper.contains(" FROM ")
            || upper.contains("\nFROM ")
            || upper.contains(" INTO ")
            || upper.contains(" SET ")
            || (at_line_start && typed_upper);

        if looks_like_sql {
            let statement = statement.trim();
            let statement = if at_line_start {
                statement
            } else {
                statement.strip_suffix('.').unwrap_or(statement)
            };
            return Some(statement.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(tool: &str, input: &str) -> AgentStep {
        AgentStep {
            tool: tool.to_string(),
            input: input.to_string(),
            output: String::new(),
        }
    }

    #[test]
    fn test_fenced_block_in_answer_wins() {
        let output = "There are 2 stores.\n\n```sql\nSELECT COUNT(*) FROM sales_stores;\n```";
        let trace = vec![step("run_query", "SELECT store_id FROM sales_stores")];
        assert_eq!(
            extract_sql(output, &trace).as_deref(),
            Some("SELECT COUNT(*) FROM sales_stores;")
        );
    }

    #[test]
    fn test_last_fenced_block_is_taken() {
        let output = "```sql\nSELECT 1\n```\nthen\n```sql\nSELECT 2\n```";
        assert_eq!(extract_sql(output, &[]).as_deref(), Some("SELECT 2"));
    }

    #[test]
    fn test_non_sql_fences_are_ignored() {
        let output = "```json\n{\"stores\": 2}\n```\nThere are 2 stores.";
        assert_eq!(extract_sql(output, &[]), None);
    }

    #[test]
    fn test_untagged_and_inline_fences() {
        assert_eq!(
            fenced_sql_blocks("```\nSELECT * FROM sales_stores\n```"),
            vec!["SELECT * FROM sales_stores"]
        );
        assert_eq!(fenced_sql_blocks("```sql SELECT 1```"), vec!["SELECT 1"]);
        assert!(fenced_sql_blocks("```\nprint('hi')\n```").is_empty());
    }

    #[test]
    fn test_newest_trace_query_when_answer_has_no_sql() {
        let trace = vec![
            step("list_tables", ""),
            step("describe_tables", "sales_stores"),
            step("run_query", "SELECT store_name FROM sales_stores LIMIT 10"),
            step("run_query", "SELECT COUNT(*) AS n\nFROM sales_stores"),
        ];
        assert_eq!(
            extract_sql("There are 2 stores.", &trace).as_deref(),
            Some("SELECT COUNT(*) AS n\nFROM sales_stores")
        );
    }

    #[test]
    fn test_failed_and_checked_queries_are_skipped() {
        let mut rejected = step("run_query", "SELECT store_name FROM sales_store");
        rejected.output = "Error: Table with name sales_store does not exist!".to_string();
        let trace = vec![
            step("run_query", "SELECT store_name FROM sales_stores"),
            step("check_query", "SELECT COUNT(*) FROM sales_stores"),
            rejected,
        ];
        assert_eq!(
            extract_sql("Here are the stores.", &trace).as_deref(),
            Some("SELECT store_name FROM sales_stores")
        );
    }

    #[test]
    fn test_write_refused_by_the_tool_is_not_recovered() {
        let mut refused = step("run_query", "DELETE FROM sales_order_items");
        refused.output = "Error: only read-only queries may be run while exploring the database".to_string();
        assert_eq!(extract_sql("I am not allowed to modify data.", &[refused]), None);
    }

    #[test]
    fn test_declined_answer_ignores_trace() {
        let trace = vec![step("run_query", "SELECT store_name FROM sales_stores LIMIT 10")];
        assert_eq!(extract_sql("I don't know", &trace), None);
        assert_eq!(extract_sql("I don\u{2019}t know.", &trace), None);
        assert_eq!(recover_sql(ITERATION_LIMIT_ANSWER, &trace), SQL_NOT_RECOVERABLE);
    }

    #[test]
    fn test_declined_answer_keeps_its_own_sql() {
        let trace = vec![step("run_query", "SELECT store_name FROM sales_stores LIMIT 10")];
        let output = "I don't know the weather, but I ran:\n```sql\nSELECT COUNT(*) FROM sales_stores\n```";
        assert_eq!(
            extract_sql(output, &trace).as_deref(),
            Some("SELECT COUNT(*) FROM sales_stores")
        );
    }

    #[test]
    fn test_keyword_line_in_answer() {
        let output = "I ran SELECT COUNT(*) FROM sales_stores.\nThe answer is 2.";
        assert_eq!(
            extract_sql(output, &[]).as_deref(),
            Some("SELECT COUNT(*) FROM sales_stores")
        );
    }

    #[test]
    fn test_prose_keywords_are_not_sql() {
        let output = "With the data available I would select the biggest store.";
        assert_eq!(extract_sql(output, &[]), None);
        assert_eq!(recover_sql(output, &[]), SQL_NOT_RECOVERABLE);
    }

    #[test]
    fn test_keyword_inside_identifier_is_skipped() {
        assert_eq!(keyword_position("preselected_items"), None);
        assert_eq!(keyword_position("  select *"), Some(2));
    }
}
