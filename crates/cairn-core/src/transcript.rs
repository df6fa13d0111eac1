const QUOTE_PAIRS: [(char, char); 4] = [('"', '"'), ('\'', '\''), ('“', '”'), ('‘', '’')];

const LABEL: &str = "task:";

/// Normalizes speech-to-text output before it becomes task text: one pair
/// of surrounding quotes and a leading `Task:` label are removed.
pub fn clean_transcript(raw: &str) -> String {
    let mut text = raw.trim();

    for (open, close) in QUOTE_PAIRS {
        if let Some(inner) = text
            .strip_prefix(open)
            .and_then(|rest| rest.strip_suffix(close))
        {
            text = inner.trim();
            break;
        }
    }

    if text
        .get(..LABEL.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(LABEL))
    {
        text = text[LABEL.len()..].trim();
    }

    text.to_string()
}
