//! URL slug utilities.
//!
//! ProCyclingStats keys every entity by a lowercase-hyphenated slug
//! (`tadej-pogacar`, `tour-de-france`). [`name_to_slug`] derives one from
//! free text and is idempotent: feeding a slug back in returns it unchanged.

/// Folds accented Latin characters to their ASCII equivalents.
///
/// Covers the diacritics that actually occur in rider, race, and team
/// names (`Pogačar`, `Vuelta a España`, `Bardet`, `Küng`, ...). Characters
/// outside the table pass through untouched; [`name_to_slug`] drops
/// anything that is still non-ASCII afterwards.
pub fn fold_ascii(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => out.push('a'),
            'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ĕ' | 'ė' | 'ę' | 'ě' => out.push('e'),
            'ì' | 'í' | 'î' | 'ï' | 'ī' | 'ĭ' | 'į' | 'ı' => out.push('i'),
            'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ŏ' | 'ő' => out.push('o'),
            'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ŭ' | 'ů' | 'ű' => out.push('u'),
            'ý' | 'ÿ' => out.push('y'),
            'ç' | 'ć' | 'č' | 'ĉ' | 'ċ' => out.push('c'),
            'ñ' | 'ń' | 'ň' | 'ņ' => out.push('n'),
            'š' | 'ś' | 'ş' | 'ș' => out.push('s'),
            'ž' | 'ź' | 'ż' => out.push('z'),
            'ł' => out.push('l'),
            'đ' | 'ď' => out.push('d'),
            'ř' => out.push('r'),
            'ť' | 'ț' => out.push('t'),
            'ğ' | 'ģ' => out.push('g'),
            'ķ' => out.push('k'),
            'ß' => out.push_str("ss"),
            'æ' => out.push_str("ae"),
            'œ' => out.push_str("oe"),
            'þ' => out.push_str("th"),
            'ð' => out.push('d'),
            other => out.push(other),
        }
    }
    out
}

/// Converts a name to a URL-friendly slug.
///
/// Transliterates to ASCII, lowercases, replaces whitespace runs with a
/// single hyphen, strips everything outside `[a-z0-9-]`, collapses
/// repeated hyphens, and trims leading/trailing hyphens. Degenerate input
/// (all punctuation, empty string) yields an empty slug.
///
/// ```
/// use pcs_assistant::slug::name_to_slug;
/// assert_eq!(name_to_slug("Tadej Pogačar"), "tadej-pogacar");
/// assert_eq!(name_to_slug("Giro d'Italia"), "giro-ditalia");
/// ```
pub fn name_to_slug(name: &str) -> String {
    let folded = fold_ascii(&name.to_lowercase());
    let mut slug = String::with_capacity(folded.len());
    let mut pending_hyphen = false;
    for c in folded.trim().chars() {
        if c.is_whitespace() || c == '-' {
            pending_hyphen = !slug.is_empty();
        } else if c.is_ascii_alphanumeric() {
            if pending_hyphen {
                slug.push('-');
                pending_hyphen = false;
            }
            slug.push(c);
        }
        // anything else is dropped without breaking the word
    }
    slug
}

/// Converts a slug back to a readable name.
///
/// ```
/// use pcs_assistant::slug::slug_to_name;
/// assert_eq!(slug_to_name("tadej-pogacar"), "Tadej Pogacar");
/// ```
pub fn slug_to_name(slug: &str) -> String {
    slug.split('-')
        .filter(|part| !part.is_empty())
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(part: &str) -> String {
    let mut chars = part.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
