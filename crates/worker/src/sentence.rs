//! Sentence extraction and TTS text normalization.
//!
//! Agent output streams in arbitrary chunks; TTS and chat want whole
//! sentences. Boundaries are the CJK/Latin terminators plus newline, with
//! trailing closing punctuation attached to the finished sentence.

const ENDINGS: &[char] = &['.', '!', '?', '。', '！', '？'];
const CLOSING: &[char] = &['"', '\'', '\u{201c}', '\u{201d}', ')', ']', '}', '」', '』', '】'];

/// Split complete sentences off the front of `text`; the remainder is the
/// unfinished tail the caller keeps buffering.
pub fn extract_sentences(text: &str) -> (Vec<String>, String) {
    if text.is_empty() {
        return (Vec::new(), String::new());
    }

    let chars: Vec<char> = text.chars().collect();
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];

        if ch == '\n' {
            let sentence: String = chars[start..i].iter().collect();
            let sentence = sentence.trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            start = i + 1;
            i = start;
            continue;
        }

        if ENDINGS.contains(&ch) {
            let mut end = i + 1;
            while end < chars.len() && (ENDINGS.contains(&chars[end]) || CLOSING.contains(&chars[end]))
            {
                end += 1;
            }
            let sentence: String = chars[start..end].iter().collect();
            let sentence = sentence.trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            start = end;
            i = end;
            continue;
        }

        i += 1;
    }

    let tail: String = chars[start..].iter().collect();
    (sentences, tail)
}

/// Strip markup that reads badly aloud: markdown emphasis/headers, code
/// fences, raw URLs; collapse whitespace.
pub fn normalize_tts_text(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '*' | '_' | '`' | '#' => continue,
            'h' => {
                // Drop http(s) URLs wholesale.
                let rest: String = std::iter::once(ch).chain(chars.clone()).collect();
                if rest.starts_with("http://") || rest.starts_with("https://") {
                    while let Some(next) = chars.peek() {
                        if next.is_whitespace() {
                            break;
                        }
                        chars.next();
                    }
                    continue;
                }
                cleaned.push(ch);
            }
            _ => cleaned.push(ch),
        }
    }

    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}
