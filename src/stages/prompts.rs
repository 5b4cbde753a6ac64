//! Prompt text for the three LLM-backed stages, in English and Chinese
//! (§4.4's CJK-ratio language selection applies to all three stages, since
//! verdict and execution share the clarification stage's language rule).

/// Which language a stage should prompt in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    English,
    Chinese,
}

/// Pick a prompt language for `input`: Chinese if more than 20% of its
/// characters fall in the CJK Unified Ideographs block (U+4E00..=U+9FFF),
/// English otherwise.
pub fn select_language(input: &str) -> Language {
    let total = input.chars().count();
    if total == 0 {
        return Language::English;
    }
    let cjk = input
        .chars()
        .filter(|c| ('\u{4E00}'..='\u{9FFF}').contains(c))
        .count();
    if (cjk as f64) / (total as f64) > 0.20 {
        Language::Chinese
    } else {
        Language::English
    }
}

/// Build the clarification stage prompt.
pub fn clarification_prompt(language: Language, input: &str) -> String {
    match language {
        Language::English => format!(
            "You are a triage assistant. Decide whether the following problem \
             statement is too ambiguous to rule on, or relies on facts that are \
             personal, evolving, or unknowable without asking the user.\n\n\
             If it is clear enough to decide, respond with exactly:\n\
             {{\"needs_clarification\": false}}\n\n\
             If it is not clear enough, respond with 2 to 4 concise questions:\n\
             {{\"needs_clarification\": true, \"reason\": string, \"questions\": \
             [{{\"id\": string, \"question\": string, \"type\": \"text\"|\"choice\"|\"multiple_choice\", \
             \"options\": [string], \"required\": bool}}]}}\n\n\
             Return only valid JSON, with no surrounding prose.\n\n\
             Problem statement:\n{input}"
        ),
        Language::Chinese => format!(
            "你是一名分诊助手。请判断以下问题陈述是否过于模糊以至于无法裁决，\
             或者是否依赖于个人的、不断变化的或在不询问用户的情况下无法得知的事实。\n\n\
             如果已经足够清楚可以裁决，请只回复：\n\
             {{\"needs_clarification\": false}}\n\n\
             如果还不够清楚，请提出 2 到 4 个简明的问题：\n\
             {{\"needs_clarification\": true, \"reason\": string, \"questions\": \
             [{{\"id\": string, \"question\": string, \"type\": \"text\"|\"choice\"|\"multiple_choice\", \
             \"options\": [string], \"required\": bool}}]}}\n\n\
             只返回有效的 JSON，不要附带任何其他文字。\n\n\
             问题陈述：\n{input}"
        ),
    }
}

/// Build the verdict stage prompt, with an optional search-results fragment
/// inserted immediately before the user input (§4.5).
pub fn verdict_prompt(language: Language, input: &str, search_fragment: Option<&str>) -> String {
    let instructions = match language {
        Language::English => {
            "You are acting as a judge. You must produce exactly one ruling: a \
             single chosen course of action. You must reject at least two \
             plausible alternatives, each with a concrete reason. Do not hedge, \
             qualify, or present multiple options as equally valid — choose one. \
             Respond with only valid JSON in this shape:\n\
             {\"ruling\": string, \"rationale\": string, \"rejected\": \
             [{\"option\": string, \"reason\": string}], \"ranking\": [integer]?}"
        }
        Language::Chinese => {
            "你正在担任裁判的角色。你必须给出恰好一个裁决：一个被选定的行动方案。\
             你必须拒绝至少两个看似合理的替代方案，并各自给出具体理由。不要模棱两可、\
             不要加限定语、不要把多个选项都说成同样有效——必须选定一个。\
             请只返回如下结构的有效 JSON：\n\
             {\"ruling\": string, \"rationale\": string, \"rejected\": \
             [{\"option\": string, \"reason\": string}], \"ranking\": [integer]?}"
        }
    };

    let mut prompt = String::new();
    prompt.push_str(instructions);
    prompt.push_str("\n\n");
    if let Some(fragment) = search_fragment {
        prompt.push_str(fragment);
        prompt.push('\n');
    }
    prompt.push_str("Problem statement:\n");
    prompt.push_str(input);
    prompt
}

/// Build the execution stage prompt from a validated ruling and rationale.
pub fn execution_prompt(language: Language, ruling: &str, rationale: &str) -> String {
    let instructions = match language {
        Language::English => {
            "You are planning execution for a ruling that has already been made. \
             Accept the ruling as given; do not second-guess or modify it. Emit a \
             minimal MVP scope, at most three phases with at most five tasks each, \
             and a list of measurable done-criteria. Respond with only valid JSON \
             in this shape:\n\
             {\"mvp_scope\": [string], \"phases\": [{\"name\": string, \"tasks\": \
             [string]}], \"done_criteria\": [string]}"
        }
        Language::Chinese => {
            "你正在为一个已经做出的裁决规划执行方案。请接受该裁决，不要质疑或修改它。\
             请给出最小化的 MVP 范围，最多三个阶段、每个阶段最多五个任务，\
             以及一份可衡量的完成标准列表。请只返回如下结构的有效 JSON：\n\
             {\"mvp_scope\": [string], \"phases\": [{\"name\": string, \"tasks\": \
             [string]}], \"done_criteria\": [string]}"
        }
    };

    format!("{instructions}\n\nRuling: {ruling}\nRationale: {rationale}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_english_for_latin_input() {
        assert_eq!(
            select_language("Should I use Go or Python for a web service?"),
            Language::English
        );
    }

    #[test]
    fn selects_chinese_above_twenty_percent_cjk() {
        assert_eq!(select_language("这是一个中文问题"), Language::Chinese);
    }

    #[test]
    fn selects_english_below_twenty_percent_cjk() {
        // One CJK character out of many Latin ones.
        let input = "Should I use 中 Go or Python for a web service across many words?";
        assert_eq!(select_language(input), Language::English);
    }

    #[test]
    fn empty_input_defaults_to_english() {
        assert_eq!(select_language(""), Language::English);
    }
}
