//! Fixed system rules and few-shot exemplars appended to generation and
//! synthesis prompts (spec §4.8's "prompt enhancement"). Neither the rule
//! set nor the exemplars are user-configurable.

pub const SYSTEM_RULES: &[&str] = &[
    "Never begin the answer with \"Based on the analysis\" or similar framing phrases.",
    "Wrap your reasoning in <thinking></thinking> and your final answer in <answer></answer>.",
    "Never repeat the question verbatim in the answer.",
    "Answer only from the provided context; say so explicitly if the context is insufficient.",
    "Do not invent citations that are not present in the context.",
    "Keep the answer concise; avoid restating the same point twice.",
    "If multiple sources disagree, state the disagreement rather than picking one silently.",
];

pub const FEW_SHOT_EXEMPLARS: &[(&str, &str)] = &[
    (
        "What was the company's revenue in 2022?",
        "<thinking>The context states FY2022 revenue directly.</thinking><answer>The company reported $73.6 billion in revenue for 2022.</answer>",
    ),
    (
        "Did the company's headcount grow?",
        "<thinking>Two filings give headcount for consecutive years; compare them.</thinking><answer>Headcount grew from 282,000 to 288,300 employees year over year.</answer>",
    ),
    (
        "What risks does the filing mention?",
        "<thinking>The context lists several risk factors; summarize without inventing ones not present.</thinking><answer>The filing cites currency volatility, supply chain disruption, and cybersecurity as principal risks.</answer>",
    ),
];

pub fn enhanced_system_preamble() -> String {
    let rules = SYSTEM_RULES
        .iter()
        .enumerate()
        .map(|(i, rule)| format!("{}. {}", i + 1, rule))
        .collect::<Vec<_>>()
        .join("\n");
    let exemplars = FEW_SHOT_EXEMPLARS
        .iter()
        .map(|(q, a)| format!("Q: {q}\nA: {a}"))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("Rules:\n{rules}\n\nExamples:\n{exemplars}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preamble_contains_all_rules_and_exemplars() {
        let preamble = enhanced_system_preamble();
        for rule in SYSTEM_RULES {
            assert!(preamble.contains(rule));
        }
        assert_eq!(FEW_SHOT_EXEMPLARS.len(), 3);
    }
}
