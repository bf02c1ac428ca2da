//! Déduction d'un nom d'utilisateur à partir d'un nom d'hôte
//!
//! Heuristique : motifs courants de nommage des postes (`user-<nom>`,
//! `<nom>-pc`, `<nom>.local`, `<nom>-laptop`...), puis replis sur un nom
//! d'hôte court qui ressemble à un prénom.

/// Suffixes reconnus, dans l'ordre d'essai
const NAME_SUFFIXES: &[&str] = &[
    "-pc",
    ".local",
    "-laptop",
    "-desktop",
    "-workstation",
    "-mac",
    "-win",
    "-ubuntu",
    "-linux",
    "-server",
    "-vm",
    "-host",
    "-machine",
    "-device",
    "-computer",
    "-notebook",
    "-system",
    "-node",
    "-client",
];

const USER_PREFIX: &str = "user-";

/// Mots génériques qui ne sont jamais des noms
const GENERIC_WORDS: &[&str] = &[
    "admin",
    "user",
    "pc",
    "laptop",
    "desktop",
    "workstation",
    "mac",
    "win",
    "ubuntu",
    "linux",
    "server",
    "vm",
    "host",
    "machine",
    "device",
    "computer",
    "notebook",
    "system",
    "node",
    "client",
    "test",
    "demo",
    "temp",
    "tmp",
];

/// Sous-domaines usuels à ne pas prendre pour un nom
const GENERIC_SUBDOMAINS: &[&str] = &["www", "mail", "ftp", "admin", "test", "dev"];

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Première suite de caractères de mot placée juste avant `suffix`
fn word_before(name: &str, suffix: &str) -> Option<String> {
    name.match_indices(suffix).find_map(|(at, _)| {
        let word: String = name[..at]
            .chars()
            .rev()
            .take_while(|c| is_word_char(*c))
            .collect();
        (!word.is_empty()).then(|| word.chars().rev().collect())
    })
}

/// Suite de caractères de mot qui suit la première occurrence de `prefix`
fn word_after(name: &str, prefix: &str) -> Option<String> {
    name.match_indices(prefix).find_map(|(at, _)| {
        let word: String = name[at + prefix.len()..]
            .chars()
            .take_while(|c| is_word_char(*c))
            .collect();
        (!word.is_empty()).then_some(word)
    })
}

/// Majuscule au début de chaque mot, minuscules ensuite (`jean_luc` → `Jean_Luc`)
fn title_case(word: &str) -> String {
    let mut titled = String::with_capacity(word.len());
    let mut previous_is_letter = false;
    for c in word.chars() {
        if c.is_alphabetic() {
            if previous_is_letter {
                titled.extend(c.to_lowercase());
            } else {
                titled.extend(c.to_uppercase());
            }
            previous_is_letter = true;
        } else {
            titled.push(c);
            previous_is_letter = false;
        }
    }
    titled
}

fn looks_like_name(candidate: &str, max_len: usize) -> bool {
    candidate.chars().next().is_some_and(char::is_uppercase)
        && candidate.chars().count() <= max_len
        && !candidate.chars().any(|c| c.is_ascii_digit())
}

/// Nom d'utilisateur probable pour `hostname`, `None` si rien ne s'en dégage
pub fn extract_user_name(hostname: &str) -> Option<String> {
    if hostname.is_empty() {
        return None;
    }
    let lowered = hostname.to_lowercase();

    let candidates = std::iter::once(word_after(&lowered, USER_PREFIX))
        .chain(NAME_SUFFIXES.iter().map(|suffix| word_before(&lowered, suffix)));
    for candidate in candidates.flatten() {
        if !GENERIC_WORDS.contains(&candidate.as_str()) {
            return Some(title_case(&candidate));
        }
    }

    // Nom d'hôte court sans domaine, déjà capitalisé
    if !hostname.contains('.') && looks_like_name(hostname, 20) {
        return Some(hostname.to_string());
    }

    // Premier label d'un nom qualifié (jean.societe.fr → jean)
    let mut labels = hostname.split('.');
    if let (Some(first), Some(_)) = (labels.next(), labels.next()) {
        if looks_like_name(first, 15) && !GENERIC_SUBDOMAINS.contains(&first.to_lowercase().as_str()) {
            return Some(first.to_string());
        }
    }

    None
}
