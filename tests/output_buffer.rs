use proptest::prelude::*;
use script_runner::exec::{DEFAULT_BUFFER_CAPACITY, OutputBuffer};

#[test]
fn default_capacity_is_ten_thousand_bytes() {
    let buf = OutputBuffer::default();
    assert_eq!(buf.capacity(), 10_000);
    assert_eq!(DEFAULT_BUFFER_CAPACITY, 10_000);
    assert!(buf.is_empty());
}

#[test]
fn keeps_everything_under_capacity() {
    let buf = OutputBuffer::new(32);
    buf.append("hello\n");
    buf.append("world\n");
    assert_eq!(buf.contents(), "hello\nworld\n");
    assert_eq!(buf.len(), 12);
}

#[test]
fn evicts_oldest_content_first() {
    let buf = OutputBuffer::new(10);
    buf.append("aaaa\n");
    buf.append("bbbb\n");
    buf.append("cc\n");

    assert_eq!(buf.len(), 10);
    assert_eq!(buf.contents(), "a\nbbbb\ncc\n");
}

#[test]
fn oversized_chunk_keeps_its_tail() {
    let buf = OutputBuffer::new(4);
    buf.append("0123456789");
    assert_eq!(buf.contents(), "6789");
}

#[test]
fn never_splits_a_character() {
    let buf = OutputBuffer::new(5);
    buf.append("ééé");
    // "ééé" is 6 bytes; the 5-byte suffix would start mid-character.
    assert_eq!(buf.contents(), "éé");
    assert!(buf.len() <= 5);
}

#[test]
fn clear_empties_the_buffer() {
    let buf = OutputBuffer::new(16);
    buf.append("something\n");
    buf.clear();
    assert!(buf.is_empty());
    assert_eq!(buf.contents(), "");

    buf.append("again\n");
    assert_eq!(buf.contents(), "again\n");
}

proptest! {
    #[test]
    fn retains_most_recent_suffix_within_capacity(
        capacity in 1usize..64,
        chunks in proptest::collection::vec("[a-z\\n]{0,20}", 0..40),
    ) {
        let buf = OutputBuffer::new(capacity);
        let mut everything = String::new();

        for chunk in &chunks {
            buf.append(chunk);
            everything.push_str(chunk);
            prop_assert!(buf.len() <= capacity);
        }

        let expected_start = everything.len().saturating_sub(capacity);
        prop_assert_eq!(buf.contents(), everything[expected_start..].to_string());
    }

    #[test]
    fn multibyte_content_stays_valid_and_bounded(
        capacity in 1usize..32,
        chunks in proptest::collection::vec("[aé€\\n]{0,8}", 0..30),
    ) {
        let buf = OutputBuffer::new(capacity);
        let mut everything = String::new();

        for chunk in &chunks {
            buf.append(chunk);
            everything.push_str(chunk);
        }

        let contents = buf.contents();
        prop_assert!(contents.len() <= capacity);
        prop_assert!(everything.ends_with(&contents));
        // Nothing more could have been kept without exceeding capacity.
        let dropped = everything.len() - contents.len();
        if dropped > 0 {
            let prev = everything[..dropped].chars().last().map_or(0, char::len_utf8);
            prop_assert!(contents.len() + prev > capacity);
        }
    }
}
