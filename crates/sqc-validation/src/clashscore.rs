// SPDX-License-Identifier: Apache-2.0

use crate::error::OutputParseError;
use crate::residue_id::decompose_clash_atom;
use sqc_model::Clash;

/// Both atom descriptors plus the separator between them.
pub const CLASH_ATOMS_WIDTH: usize = 34;
const ATOM_FIELD_WIDTH: usize = CLASH_ATOMS_WIDTH / 2;
const MAGNITUDE_PREFIX: &str = ":";

const FOOTER_LINES: usize = 2;
const HEADER_LINES: usize = 4;
const HYDROGEN_HEADER_LINES: usize = 5;
const HYDROGEN_ADDITION_MARKER: &str = "hydrogen addition";

/// Parses `clashscore` text output.
///
/// The last two lines are a summary footer. The header is four lines, or
/// five when the tool reports hydrogen addition on its third line. Every
/// other non-blank line is `<atom:17> <atom:16>:<magnitude>`.
pub fn parse_clashscore(output: &str) -> Result<Vec<Clash>, OutputParseError> {
    let lines: Vec<&str> = output.lines().collect();
    let body = &lines[..lines.len().saturating_sub(FOOTER_LINES)];
    if body.len() < 3 {
        return Err(OutputParseError::TruncatedClashscore(lines.len()));
    }
    let header = if body[2].contains(HYDROGEN_ADDITION_MARKER) {
        HYDROGEN_HEADER_LINES
    } else {
        HEADER_LINES
    };

    body.iter()
        .enumerate()
        .skip(header)
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| parse_clash_line(index + 1, line))
        .collect()
}

fn parse_clash_line(number: usize, line: &str) -> Result<Clash, OutputParseError> {
    let malformed = |message: &str| OutputParseError::ClashLine {
        line: number,
        message: message.to_string(),
    };

    let first = line
        .get(..ATOM_FIELD_WIDTH)
        .ok_or_else(|| malformed("line is shorter than the atom columns"))?;
    let second = line
        .get(ATOM_FIELD_WIDTH + 1..CLASH_ATOMS_WIDTH)
        .ok_or_else(|| malformed("line is shorter than the atom columns"))?;
    if line.get(CLASH_ATOMS_WIDTH..CLASH_ATOMS_WIDTH + 1) != Some(MAGNITUDE_PREFIX) {
        return Err(malformed("missing ':' before the clash magnitude"));
    }
    let magnitude = line[CLASH_ATOMS_WIDTH + 1..]
        .trim()
        .parse::<f64>()
        .map_err(|_| malformed("clash magnitude is not a number"))?;

    Ok(Clash {
        first_atom: decompose_clash_atom(first)?,
        second_atom: decompose_clash_atom(second)?,
        magnitude,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqc_model::Atom;

    fn clash_line(first: &str, second: &str, magnitude: &str) -> String {
        format!("{first:<17} {second:<16}:{magnitude}")
    }

    fn output(header: &[&str], clashes: &[String]) -> String {
        let mut out: Vec<String> = header.iter().map(|l| (*l).to_string()).collect();
        out.extend(clashes.iter().cloned());
        out.push(String::new());
        out.push("clashscore = 4.21".to_string());
        out.join("\n")
    }

    const HEADER: [&str; 4] = [
        "# clashscore",
        "Using electron cloud x-H bond lengths",
        "Bad Clashes >= 0.4 Angstrom:",
        "",
    ];

    #[test]
    fn parses_spaced_and_fused_atoms() {
        let out = output(
            &HEADER,
            &[
                clash_line(" A   9  LYS  HA", " B  12  LEU HD12", "0.612"),
                clash_line(" X1034  ASP  C", " X1035  GLY  N", "0.405"),
            ],
        );
        let clashes = parse_clashscore(&out).expect("parse");
        assert_eq!(clashes.len(), 2);
        assert_eq!(
            clashes[0].first_atom,
            Atom {
                chain: 'A',
                residue_number: 9,
                atom: "HA".to_string()
            }
        );
        assert_eq!(clashes[0].second_atom.atom, "HD12");
        assert_eq!(clashes[0].magnitude, 0.612);
        assert_eq!(clashes[1].first_atom.residue_number, 1034);
        assert_eq!(clashes[1].second_atom.chain, 'X');
    }

    #[test]
    fn hydrogen_addition_header_is_one_line_longer() {
        let header = [
            "# clashscore",
            "Using electron cloud x-H bond lengths",
            "Performing hydrogen addition with reduce",
            "Bad Clashes >= 0.4 Angstrom:",
            "",
        ];
        let out = output(
            &header,
            &[clash_line(" A   9  LYS  HA", " B  12  LEU HD12", "0.612")],
        );
        let clashes = parse_clashscore(&out).expect("parse");
        assert_eq!(clashes.len(), 1);
    }

    #[test]
    fn no_clashes_is_an_empty_list() {
        let clashes = parse_clashscore(&output(&HEADER, &[])).expect("parse");
        assert!(clashes.is_empty());
    }

    #[test]
    fn malformed_lines_are_rejected() {
        let missing_colon = output(
            &HEADER,
            &[clash_line(" A   9  LYS  HA", " B  12  LEU HD12", "0.612").replace(':', " ")],
        );
        assert!(matches!(
            parse_clashscore(&missing_colon),
            Err(OutputParseError::ClashLine { line: 5, .. })
        ));

        let bad_atom = output(
            &HEADER,
            &[clash_line(" A   9  LYS", " B  12  LEU HD12", "0.612")],
        );
        assert!(matches!(
            parse_clashscore(&bad_atom),
            Err(OutputParseError::ClashAtom { .. })
        ));

        assert!(matches!(
            parse_clashscore("clashscore = 0\n"),
            Err(OutputParseError::TruncatedClashscore(1))
        ));
    }
}
