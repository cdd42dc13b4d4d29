//! Turning raw badge data into a subject identity.
//!
//! A badge stores the employee name across data blocks (first name, then last
//! name). The reader front end hands over the raw block contents; each block
//! is reduced to its printable ASCII characters and trimmed, and the non-empty
//! parts are joined with a single space.

/// Separator between block fields on one line from the reader front end.
pub const BLOCK_SEPARATOR: u8 = b'\t';

/// Names shorter than this are treated as unreadable.
pub const MIN_NAME_LEN: usize = 2;

/// Printable ASCII content of one block, trimmed.
///
/// Unwritten blocks are usually zero-filled; those bytes are dropped along
/// with any other control or non-ASCII byte.
pub fn block_text(block: &[u8]) -> String {
    let printable: String = block
        .iter()
        .filter(|b| (32..=126).contains(*b))
        .map(|b| char::from(*b))
        .collect();
    printable.trim().to_string()
}

/// Assembles the employee name from the name blocks, in card order.
///
/// Blank blocks are skipped. Returns `None` when the result is too short to
/// be a name.
pub fn assemble_name<B: AsRef<[u8]>>(blocks: &[B]) -> Option<String> {
    let parts: Vec<String> = blocks
        .iter()
        .map(|block| block_text(block.as_ref()))
        .filter(|text| !text.is_empty())
        .collect();

    let name = parts.join(" ");
    (name.chars().count() >= MIN_NAME_LEN).then_some(name)
}

/// Resolves one line from the reader front end: block fields separated by
/// [`BLOCK_SEPARATOR`], without the trailing newline.
pub fn resolve_line(line: &[u8]) -> Option<String> {
    let blocks: Vec<&[u8]> = line.split(|b| *b == BLOCK_SEPARATOR).collect();
    assemble_name(&blocks)
}
