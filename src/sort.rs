//! Sibling ordering for library trees
//!
//! Directories sort before files. Within a kind, names compare
//! case-insensitively with digit runs compared by numeric value, so
//! "Episode 2" sorts before "Episode 10".

use std::cmp::Ordering;

use crate::models::LibraryNode;

/// Compare two names in natural order
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => break,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let lhs = take_digits(&mut left);
                let rhs = take_digits(&mut right);
                let ord = compare_digit_runs(&lhs, &rhs);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                let ord = fold_char(x).cmp(&fold_char(y));
                if ord != Ordering::Equal {
                    return ord;
                }
                left.next();
                right.next();
            }
        }
    }

    // Names equal up to case and leading zeros: fall back to a total order.
    a.cmp(b)
}

/// Order siblings: directories first, then files, each in natural name order
pub fn sibling_cmp(a: &LibraryNode, b: &LibraryNode) -> Ordering {
    match (a.is_dir(), b.is_dir()) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => natural_cmp(&a.name, &b.name),
    }
}

pub fn sort_siblings(children: &mut [LibraryNode]) {
    children.sort_by(sibling_cmp);
}

fn take_digits(iter: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(c) = iter.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        run.push(c);
        iter.next();
    }
    run
}

fn compare_digit_runs(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn fold_char(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}
