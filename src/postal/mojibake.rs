/// (corrupted, intended) pairs, each UTF-8 sequence as read through both
/// Windows-1252 and ISO-8859-1. A key must precede any longer key it
/// prefixes, so three-character sequences come first.
pub const MOJIBAKE_TABLE: &[(&str, &str)] = &[
    ("â€™", "’"),
    ("â\u{80}\u{99}", "’"),
    ("â€˜", "‘"),
    ("â\u{80}\u{98}", "‘"),
    ("â€œ", "“"),
    ("â\u{80}\u{9c}", "“"),
    ("â€\u{9d}", "”"),
    ("â\u{80}\u{9d}", "”"),
    ("â€“", "–"),
    ("â\u{80}\u{93}", "–"),
    ("â€”", "—"),
    ("â\u{80}\u{94}", "—"),
    ("â€¦", "…"),
    ("â\u{80}¦", "…"),
    ("â‚¬", "€"),
    ("â\u{82}¬", "€"),
    ("â€¢", "•"),
    ("â\u{80}¢", "•"),
    ("â„¢", "™"),
    ("â\u{84}¢", "™"),
    ("â€\u{a0}", "†"),
    ("â\u{80}\u{a0}", "†"),
    ("â€¡", "‡"),
    ("â\u{80}¡", "‡"),
    ("â€°", "‰"),
    ("â\u{80}°", "‰"),
    ("â€š", "‚"),
    ("â\u{80}\u{9a}", "‚"),
    ("â€ž", "„"),
    ("â\u{80}\u{9e}", "„"),
    ("â€¹", "‹"),
    ("â\u{80}¹", "‹"),
    ("â€º", "›"),
    ("â\u{80}º", "›"),
    ("Å’", "Œ"),
    ("Å\u{92}", "Œ"),
    ("Å“", "œ"),
    ("Å\u{93}", "œ"),
    ("Å\u{a0}", "Š"),
    ("Å¡", "š"),
    ("Å¸", "Ÿ"),
    ("Å½", "Ž"),
    ("Å¾", "ž"),
    ("Ã€", "À"),
    ("Ã\u{80}", "À"),
    ("Ã\u{81}", "Á"),
    ("Ã‚", "Â"),
    ("Ã\u{82}", "Â"),
    ("Ãƒ", "Ã"),
    ("Ã\u{83}", "Ã"),
    ("Ã„", "Ä"),
    ("Ã\u{84}", "Ä"),
    ("Ã…", "Å"),
    ("Ã\u{85}", "Å"),
    ("Ã†", "Æ"),
    ("Ã\u{86}", "Æ"),
    ("Ã‡", "Ç"),
    ("Ã\u{87}", "Ç"),
    ("Ãˆ", "È"),
    ("Ã\u{88}", "È"),
    ("Ã‰", "É"),
    ("Ã\u{89}", "É"),
    ("ÃŠ", "Ê"),
    ("Ã\u{8a}", "Ê"),
    ("Ã‹", "Ë"),
    ("Ã\u{8b}", "Ë"),
    ("ÃŒ", "Ì"),
    ("Ã\u{8c}", "Ì"),
    ("Ã\u{8d}", "Í"),
    ("ÃŽ", "Î"),
    ("Ã\u{8e}", "Î"),
    ("Ã\u{8f}", "Ï"),
    ("Ã\u{90}", "Ð"),
    ("Ã‘", "Ñ"),
    ("Ã\u{91}", "Ñ"),
    ("Ã’", "Ò"),
    ("Ã\u{92}", "Ò"),
    ("Ã“", "Ó"),
    ("Ã\u{93}", "Ó"),
    ("Ã”", "Ô"),
    ("Ã\u{94}", "Ô"),
    ("Ã•", "Õ"),
    ("Ã\u{95}", "Õ"),
    ("Ã–", "Ö"),
    ("Ã\u{96}", "Ö"),
    ("Ã—", "×"),
    ("Ã\u{97}", "×"),
    ("Ã˜", "Ø"),
    ("Ã\u{98}", "Ø"),
    ("Ã™", "Ù"),
    ("Ã\u{99}", "Ù"),
    ("Ãš", "Ú"),
    ("Ã\u{9a}", "Ú"),
    ("Ã›", "Û"),
    ("Ã\u{9b}", "Û"),
    ("Ãœ", "Ü"),
    ("Ã\u{9c}", "Ü"),
    ("Ã\u{9d}", "Ý"),
    ("Ãž", "Þ"),
    ("Ã\u{9e}", "Þ"),
    ("ÃŸ", "ß"),
    ("Ã\u{9f}", "ß"),
    ("Ã\u{a0}", "à"),
    ("Ã¡", "á"),
    ("Ã¢", "â"),
    ("Ã£", "ã"),
    ("Ã¤", "ä"),
    ("Ã¥", "å"),
    ("Ã¦", "æ"),
    ("Ã§", "ç"),
    ("Ã¨", "è"),
    ("Ã©", "é"),
    ("Ãª", "ê"),
    ("Ã«", "ë"),
    ("Ã¬", "ì"),
    ("Ã\u{ad}", "í"),
    ("Ã®", "î"),
    ("Ã¯", "ï"),
    ("Ã°", "ð"),
    ("Ã±", "ñ"),
    ("Ã²", "ò"),
    ("Ã³", "ó"),
    ("Ã´", "ô"),
    ("Ãµ", "õ"),
    ("Ã¶", "ö"),
    ("Ã·", "÷"),
    ("Ã¸", "ø"),
    ("Ã¹", "ù"),
    ("Ãº", "ú"),
    ("Ã»", "û"),
    ("Ã¼", "ü"),
    ("Ã½", "ý"),
    ("Ã¾", "þ"),
    ("Ã¿", "ÿ"),
    ("Â\u{a0}", "\u{a0}"),
    ("Â¡", "¡"),
    ("Â¢", "¢"),
    ("Â£", "£"),
    ("Â¤", "¤"),
    ("Â¥", "¥"),
    ("Â¦", "¦"),
    ("Â§", "§"),
    ("Â¨", "¨"),
    ("Â©", "©"),
    ("Âª", "ª"),
    ("Â«", "«"),
    ("Â¬", "¬"),
    ("Â\u{ad}", "\u{ad}"),
    ("Â®", "®"),
    ("Â¯", "¯"),
    ("Â°", "°"),
    ("Â±", "±"),
    ("Â²", "²"),
    ("Â³", "³"),
    ("Â´", "´"),
    ("Âµ", "µ"),
    ("Â¶", "¶"),
    ("Â·", "·"),
    ("Â¸", "¸"),
    ("Â¹", "¹"),
    ("Âº", "º"),
    ("Â»", "»"),
    ("Â¼", "¼"),
    ("Â½", "½"),
    ("Â¾", "¾"),
    ("Â¿", "¿"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairOutcome {
    pub text: String,
    pub substitutions: usize,
    pub passes: usize,
}

pub fn repair(text: &str) -> String {
    repair_with(text, MOJIBAKE_TABLE).text
}

pub fn repair_with(text: &str, table: &[(&str, &str)]) -> RepairOutcome {
    let mut current = text.to_string();
    let mut substitutions = 0;
    let mut passes = 0;
    loop {
        let (next, count) = repair_pass(&current, table);
        if count == 0 {
            break;
        }
        current = next;
        substitutions += count;
        passes += 1;
    }
    RepairOutcome {
        text: current,
        substitutions,
        passes,
    }
}

fn repair_pass(text: &str, table: &[(&str, &str)]) -> (String, usize) {
    let mut leads: Vec<char> = table.iter().filter_map(|(from, _)| from.chars().next()).collect();
    leads.sort_unstable();
    leads.dedup();

    let mut out = String::with_capacity(text.len());
    let mut count = 0;
    let mut rest = text;
    while let Some(at) = rest.find(|c: char| leads.binary_search(&c).is_ok()) {
        out.push_str(&rest[..at]);
        rest = &rest[at..];
        match table.iter().find(|(from, _)| rest.starts_with(from)) {
            Some((from, to)) => {
                out.push_str(to);
                rest = &rest[from.len()..];
                count += 1;
            }
            None => {
                let Some(ch) = rest.chars().next() else {
                    break;
                };
                out.push(ch);
                rest = &rest[ch.len_utf8()..];
            }
        }
    }
    out.push_str(rest);
    (out, count)
}
