//! Ranked therapeutic interventions for a set of detected patterns and an
//! emotional state.

use clarity_types::{EmotionalState, Intervention, InterventionKind, PatternMatch};

const MAX_INTERVENTIONS: usize = 5;

/// Concrete techniques for the patterns that have them.
pub fn techniques_for(pattern_name: &str) -> Option<&'static [&'static str]> {
    let techniques: &'static [&'static str] = match pattern_name {
        "all_or_nothing" => &[
            "Identify exceptions to absolute statements",
            "Practice using qualifying words (sometimes, often, rarely)",
            "Create a continuum scale for situations",
        ],
        "catastrophizing" => &[
            "Examine evidence for and against worst-case scenarios",
            "Practice probability estimation",
            "Develop coping strategies for realistic outcomes",
        ],
        "rumination" => &[
            "Set specific worry time",
            "Practice mindfulness meditation",
            "Use thought stopping techniques",
        ],
        "perfectionism" => &[
            "Set realistic, achievable goals",
            "Practice self-compassion exercises",
            "Celebrate progress over perfection",
        ],
        _ => return None,
    };
    Some(techniques)
}

fn emotion_support(emotion: &str) -> Option<(&'static str, [&'static str; 3])> {
    match emotion {
        "anxiety" => Some((
            "Anxiety management and relaxation techniques",
            ["Deep breathing exercises", "Progressive muscle relaxation", "Grounding techniques"],
        )),
        "depression" => Some((
            "Behavioral activation and mood enhancement",
            ["Activity scheduling", "Mood monitoring", "Social connection building"],
        )),
        "anger" => Some((
            "Anger management and emotional regulation",
            ["Anger logs", "Relaxation training", "Communication skills"],
        )),
        _ => None,
    }
}

fn pattern_priority(pattern: &PatternMatch) -> u32 {
    (pattern.severity.priority_score() * pattern.confidence * 10.0) as u32
}

/// Builds and ranks interventions, highest priority first, at most five.
pub fn suggest(patterns: &[PatternMatch], emotion: &EmotionalState) -> Vec<Intervention> {
    let mut out: Vec<Intervention> = patterns
        .iter()
        .map(|p| Intervention {
            kind: InterventionKind::PatternBased,
            target: p.name.clone(),
            approach: p.therapeutic_approach.clone(),
            priority: pattern_priority(p),
            techniques: techniques_for(&p.name)
                .map(|t| t.iter().map(|s| s.to_string()).collect())
                .unwrap_or_else(|| vec![p.therapeutic_approach.clone()]),
        })
        .collect();

    if let Some((approach, techniques)) = emotion_support(&emotion.primary_emotion) {
        out.push(Intervention {
            kind: InterventionKind::EmotionBased,
            target: format!("{} ({})", emotion.primary_emotion, emotion.intensity),
            approach: approach.to_string(),
            priority: emotion.intensity.weight() * 10,
            techniques: techniques.iter().map(|s| s.to_string()).collect(),
        });
    }

    // stable: equal priorities keep pattern order
    out.sort_by(|a, b| b.priority.cmp(&a.priority));
    out.truncate(MAX_INTERVENTIONS);
    out
}
