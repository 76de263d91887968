use super::*;

fn line_sizes(chunk: &str) -> Vec<usize> {
    chunk
        .split_inclusive('\n')
        .map(|line| line.strip_suffix('\n').unwrap_or(line).chars().count() + 1)
        .collect()
}

fn sample_inputs() -> Vec<String> {
    vec![
        "fn main() {\n    println!(\"hello\");\n}\n".to_string(),
        "no trailing newline\nsecond line".to_string(),
        "\n\n\n".to_string(),
        "x".repeat(3000),
        (0..200)
            .map(|i| format!("let value_{i} = compute({i}) * {i};\n"))
            .collect(),
        "mixed\r\nline endings\r\nkeep carriage returns\n".to_string(),
    ]
}

#[test]
fn empty_input_yields_no_chunks() {
    assert!(split_into_chunks("", 1000).is_empty());
}

#[test]
fn small_input_is_single_chunk() {
    let chunks = split_into_chunks("package main\n", 1000);
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, "package main\n");
    assert_eq!(chunks[0].index, 0);
    assert_eq!(chunks[0].total, 1);
}

#[test]
fn chunks_reassemble_original_text() {
    for input in sample_inputs() {
        for target in [1, 10, 64, 1000] {
            let chunks = split_into_chunks(&input, target);
            let rebuilt: String = chunks.iter().map(|c| c.text.as_str()).collect();
            assert_eq!(rebuilt, input, "target size {target}");
        }
    }
}

#[test]
fn chunks_preserve_line_order() {
    let input: String = (0..100).map(|i| format!("line {i}\n")).collect();
    let chunks = split_into_chunks(&input, 50);

    let lines: Vec<&str> = chunks.iter().flat_map(|c| c.text.lines()).collect();
    let expected: Vec<String> = (0..100).map(|i| format!("line {i}")).collect();
    assert_eq!(lines, expected);
}

#[test]
fn chunk_size_stays_within_target_unless_single_line() {
    for input in sample_inputs() {
        for target in [10, 64, 1000] {
            for chunk in split_into_chunks(&input, target) {
                let sizes = line_sizes(&chunk.text);
                if sizes.len() > 1 {
                    assert!(
                        sizes.iter().sum::<usize>() <= target,
                        "chunk {:?} exceeds target {}",
                        chunk.text,
                        target
                    );
                }
            }
        }
    }
}

#[test]
fn oversized_line_becomes_its_own_chunk() {
    let long_line = "x".repeat(50);
    let input = format!("{long_line}\nshort\n");
    let chunks = split_into_chunks(&input, 10);

    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].text, format!("{long_line}\n"));
    assert_eq!(chunks[1].text, "short\n");
}

#[test]
fn exact_boundaries_for_literal_input() {
    // Line sizes 5, 3 and 7: the first two fit exactly in 8
    let chunks = split_into_chunks("aaaa\nbb\ncccccc\n", 8);
    let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, vec!["aaaa\nbb\n", "cccccc\n"]);
}

#[test]
fn size_is_measured_in_characters() {
    // Three characters per line including the newline, five bytes each
    let chunks = split_into_chunks("éé\néé\n", 6);
    assert_eq!(chunks.len(), 1);

    let chunks = split_into_chunks("éé\néé\n", 5);
    assert_eq!(chunks.len(), 2);
}

#[test]
fn twenty_five_hundred_character_file_at_default_size() {
    // 50 lines of 49 characters plus newline
    let lines: Vec<String> = (0..50).map(|i| format!("{:0>49}", i)).collect();
    let input: String = lines.iter().map(|l| format!("{l}\n")).collect();
    assert_eq!(input.len(), 2500);

    let chunks = split_into_chunks(&input, DEFAULT_CHUNK_SIZE);
    assert_eq!(chunks.len(), 3);

    let expected = [lines[..20].to_vec(), lines[20..40].to_vec(), lines[40..].to_vec()];
    for (chunk, expected_lines) in chunks.iter().zip(expected.iter()) {
        let actual: Vec<&str> = chunk.text.lines().collect();
        assert_eq!(actual, *expected_lines);
    }
    assert_eq!(chunks[0].text.len(), 1000);
    assert_eq!(chunks[1].text.len(), 1000);
    assert_eq!(chunks[2].text.len(), 500);
}

#[test]
fn chunk_indices_and_totals() {
    let input: String = (0..30).map(|i| format!("{i:>9}\n")).collect();
    let chunks = split_into_chunks(&input, 100);

    assert_eq!(chunks.len(), 3);
    for (position, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.index, position);
        assert_eq!(chunk.total, 3);
    }
}

#[test]
fn final_line_without_newline_is_kept() {
    let chunks = split_into_chunks("first\nlast", 1000);
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, "first\nlast");
}

#[test]
fn trailing_newline_does_not_start_an_empty_line() {
    // The final newline belongs to the last line, so a file that exactly
    // fills the budget stays one chunk with no empty tail chunk
    let chunks = split_into_chunks("aaaa\nbbb\n", 9);
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, "aaaa\nbbb\n");
    assert_eq!(chunks[0].total, 1);

    let chunks = split_into_chunks("aaaa\nbbb\nc\n", 9);
    let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, vec!["aaaa\nbbb\n", "c\n"]);
}

#[test]
fn document_id_is_deterministic() {
    let first = document_id("src/main.rs", "fn main() {}\n");
    let second = document_id("src/main.rs", "fn main() {}\n");
    assert_eq!(first, second);
    assert_eq!(first.len(), 64);
    assert!(
        first
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
    );
}

#[test]
fn document_id_changes_with_path_or_content() {
    let base = document_id("src/lib.rs", "pub mod a;\n");
    assert_ne!(base, document_id("src/main.rs", "pub mod a;\n"));
    assert_ne!(base, document_id("src/lib.rs", "pub mod b;\n"));
}

#[test]
fn document_id_hashes_plain_concatenation() {
    // SHA-256("abc")
    assert_eq!(
        document_id("a", "bc"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
    assert_eq!(document_id("a", "bc"), document_id("ab", "c"));
}
