//! Verhoeff check digit, as used by the 12-digit national ID number.
//!
//! The dihedral-group construction catches every single-digit substitution
//! and every adjacent transposition.

const MULTIPLICATION: [[u8; 10]; 10] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
    [1, 2, 3, 4, 0, 6, 7, 8, 9, 5],
    [2, 3, 4, 0, 1, 7, 8, 9, 5, 6],
    [3, 4, 0, 1, 2, 8, 9, 5, 6, 7],
    [4, 0, 1, 2, 3, 9, 5, 6, 7, 8],
    [5, 9, 8, 7, 6, 0, 4, 3, 2, 1],
    [6, 5, 9, 8, 7, 1, 0, 4, 3, 2],
    [7, 6, 5, 9, 8, 2, 1, 0, 4, 3],
    [8, 7, 6, 5, 9, 3, 2, 1, 0, 4],
    [9, 8, 7, 6, 5, 4, 3, 2, 1, 0],
];

const PERMUTATION: [[u8; 10]; 8] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
    [1, 5, 7, 6, 2, 8, 3, 0, 9, 4],
    [5, 8, 0, 3, 7, 9, 6, 1, 4, 2],
    [8, 9, 1, 6, 0, 4, 3, 5, 2, 7],
    [9, 4, 5, 3, 1, 2, 6, 8, 7, 0],
    [4, 2, 8, 6, 5, 7, 3, 9, 0, 1],
    [2, 7, 9, 3, 8, 0, 6, 4, 1, 5],
    [7, 0, 4, 6, 9, 1, 3, 2, 5, 8],
];

const INVERSE: [u8; 10] = [0, 4, 3, 2, 1, 5, 6, 7, 8, 9];

fn digits(input: &str) -> Option<Vec<u8>> {
    input
        .chars()
        .map(|c| c.to_digit(10).map(|d| d as u8))
        .collect()
}

/// Returns true when `number` (digits only, check digit last) carries a
/// valid Verhoeff check digit. Non-digit input is never valid.
pub fn verhoeff_valid(number: &str) -> bool {
    let Some(digits) = digits(number) else {
        return false;
    };
    if digits.is_empty() {
        return false;
    }

    let mut check = 0u8;
    for (i, digit) in digits.iter().rev().enumerate() {
        check = MULTIPLICATION[check as usize][PERMUTATION[i % 8][*digit as usize] as usize];
    }
    check == 0
}

/// Computes the check digit to append to `payload`.
pub fn verhoeff_check_digit(payload: &str) -> Option<u8> {
    let digits = digits(payload)?;

    let mut check = 0u8;
    for (i, digit) in digits.iter().rev().enumerate() {
        check = MULTIPLICATION[check as usize][PERMUTATION[(i + 1) % 8][*digit as usize] as usize];
    }
    Some(INVERSE[check as usize])
}
