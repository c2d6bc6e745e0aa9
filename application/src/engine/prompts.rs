//! Prompt builders for each engine phase
//!
//! The exact wording is deliberately plain; the engine's guarantees do not
//! depend on it. Every builder returns a complete prompt string.

use conclave_domain::{PersonaProfile, RoundPhase, RoundSummary, SubProblem, SubProblemResult};

pub fn decomposition(title: &str, description: &str, context: &str, max: usize) -> String {
    format!(
        "Decompose the following problem into at most {max} independent sub-problems.\n\
         Respond with a JSON array of objects: \
         {{\"id\", \"goal\", \"complexity\" (1-10), \"depends_on\"}}.\n\n\
         Problem: {title}\n{description}\n\nContext:\n{context}"
    )
}

pub fn gap_check(title: &str, context: &str, sub_problems: &[SubProblem]) -> String {
    let goals: Vec<String> = sub_problems
        .iter()
        .map(|sp| format!("- {} ({})", sp.goal, sp.id))
        .collect();
    format!(
        "Identify missing information needed to deliberate this problem well.\n\
         List each gap on its own line as PRIORITY: question | reason,\n\
         where PRIORITY is CRITICAL, IMPORTANT or OPTIONAL.\n\
         Only mark a gap CRITICAL if deliberation cannot proceed without it.\n\n\
         Problem: {title}\nSub-problems:\n{}\n\nKnown context:\n{context}",
        goals.join("\n")
    )
}

pub fn persona_system(persona: &PersonaProfile) -> String {
    format!(
        "You are {}, one expert on a deliberation panel.\n{}\n\
         Always end with a section starting with RECOMMENDATION: containing \
         your current position.",
        persona.name, persona.role_prompt
    )
}

fn phase_guidance(phase: RoundPhase) -> &'static str {
    match phase {
        RoundPhase::Exploration => {
            "Explore the solution space. Surface options, constraints and unknowns."
        }
        RoundPhase::Challenge => {
            "Critically engage with the positions so far. Name risks, weak \
             assumptions and failure modes explicitly."
        }
        RoundPhase::Convergence => {
            "Converge. Commit to one recommendation and what it would take."
        }
    }
}

pub struct ContributionPromptInput<'a> {
    pub goal: &'a str,
    pub context: &'a str,
    pub round: usize,
    pub phase: RoundPhase,
    pub summaries: &'a [RoundSummary],
    pub guidance: &'a [String],
    pub memory: Option<&'a str>,
    pub dependency_context: &'a str,
    pub research: &'a [String],
}

pub fn contribution(input: &ContributionPromptInput<'_>) -> String {
    let mut prompt = format!(
        "Round {} ({}).\n{}\n\nSub-problem: {}\n\nContext:\n{}\n",
        input.round,
        input.phase,
        phase_guidance(input.phase),
        input.goal,
        input.context
    );
    if !input.dependency_context.is_empty() {
        prompt.push_str(&format!(
            "\nResults of sub-problems this one depends on:\n{}\n",
            input.dependency_context
        ));
    }
    if let Some(memory) = input.memory {
        prompt.push_str(&format!("\nYour notes from earlier sub-problems:\n{memory}\n"));
    }
    if !input.summaries.is_empty() {
        prompt.push_str("\nPrevious rounds:\n");
        for s in input.summaries {
            prompt.push_str(&format!("Round {} ({}): {}\n", s.round, s.phase, s.text));
        }
    }
    if !input.research.is_empty() {
        prompt.push_str("\nRelevant research findings:\n");
        for r in input.research {
            prompt.push_str(&format!("- {r}\n"));
        }
    }
    if !input.guidance.is_empty() {
        prompt.push_str("\nFacilitator guidance:\n");
        for g in input.guidance {
            prompt.push_str(&format!("- {g}\n"));
        }
    }
    prompt
}

pub fn simplified_retry(goal: &str, phase: RoundPhase) -> String {
    format!(
        "Answer in two short paragraphs, then a final line starting with \
         RECOMMENDATION:.\n{}\n\nSub-problem: {goal}",
        phase_guidance(phase)
    )
}

pub fn challenge_retry(goal: &str, previous: &str) -> String {
    format!(
        "Your previous answer did not critically engage with the debate. \
         Rewrite it naming at least two concrete risks or weak assumptions, \
         and keep the final RECOMMENDATION: line.\n\n\
         Sub-problem: {goal}\n\nYour previous answer:\n{previous}"
    )
}

pub fn round_summary(round: usize, phase: RoundPhase, transcript: &str) -> String {
    format!(
        "Summarize round {round} ({phase}) of this expert deliberation in one \
         dense paragraph. Preserve disagreements and open questions.\n\n{transcript}"
    )
}

pub fn vote(goal: &str, summaries: &[RoundSummary]) -> String {
    let history: Vec<String> = summaries
        .iter()
        .map(|s| format!("Round {}: {}", s.round, s.text))
        .collect();
    format!(
        "The deliberation on \"{goal}\" has ended. Give your final position as \
         JSON: {{\"recommendation\", \"confidence\" (0-1), \"reasoning\", \
         \"conditions\": [..]}}.\n\nDeliberation history:\n{}",
        history.join("\n")
    )
}

pub fn synthesis(
    goal: &str,
    summaries: &[RoundSummary],
    final_round: &str,
    votes: &str,
    limited_context: bool,
) -> String {
    let disclosure = if limited_context {
        "\nContext was limited; include a section titled 'Assumptions' \
         disclosing what had to be assumed.\n"
    } else {
        ""
    };
    let history: Vec<String> = summaries
        .iter()
        .map(|s| format!("Round {} ({}): {}", s.round, s.phase, s.text))
        .collect();
    format!(
        "Write the synthesis report for the sub-problem \"{goal}\": the \
         recommendation, the strongest dissent, and concrete next steps.{disclosure}\n\
         Round summaries:\n{}\n\nFinal round transcript:\n{final_round}\n\n\
         Expert votes:\n{votes}",
        history.join("\n")
    )
}

pub fn continuation(tail: &str) -> String {
    format!(
        "Your previous output was cut off. Continue exactly where it stopped; \
         do not repeat anything. It ended with:\n...{tail}"
    )
}

pub fn memory_summary(persona_name: &str, contributions: &str) -> String {
    format!(
        "Summarize the positions {persona_name} took in this deliberation in \
         2-3 sentences, written as notes to their future self.\n\n{contributions}"
    )
}

pub fn meta_synthesis(title: &str, results: &[SubProblemResult]) -> String {
    let sections: Vec<String> = results
        .iter()
        .map(|r| format!("## {}\n{}", r.sub_problem_id, r.synthesis))
        .collect();
    format!(
        "Aggregate these sub-problem syntheses for \"{title}\" into one \
         cross-cutting action plan with ordered steps, owners and risks.\n\n{}",
        sections.join("\n\n")
    )
}
