use std::net::{IpAddr, SocketAddr};

use axum::http::HeaderMap;

use crate::error::AppError;
use crate::models::game::Color;

/// Strict move format: `[a-h][1-8][a-h][1-8]` with an optional promotion
/// piece. Anything else never reaches the engine.
pub fn valid_move_format(mv: &str) -> bool {
    let bytes = mv.as_bytes();
    if !(4..=5).contains(&bytes.len()) {
        return false;
    }
    let square = |file: u8, rank: u8| (b'a'..=b'h').contains(&file) && (b'1'..=b'8').contains(&rank);
    if !square(bytes[0], bytes[1]) || !square(bytes[2], bytes[3]) {
        return false;
    }
    bytes.len() == 4 || matches!(bytes[4], b'q' | b'r' | b'b' | b'n')
}

/// Safety check for user-supplied FEN before it is written to the engine's
/// stdin. The line protocol is newline-delimited, so this is the
/// protocol-injection guard: field structure only, no control characters,
/// no legality judgement (the engine canonicalizes afterwards).
pub fn valid_fen_input(fen: &str) -> bool {
    if fen.len() > 100 || fen.chars().any(|c| c.is_control()) {
        return false;
    }
    let fields: Vec<&str> = fen.split(' ').filter(|f| !f.is_empty()).collect();
    if fields.len() != 6 {
        return false;
    }

    let placement_ok = fields[0].split('/').count() == 8
        && fields[0]
            .chars()
            .all(|c| "pnbrqkPNBRQK12345678/".contains(c));
    let turn_ok = fields[1] == "w" || fields[1] == "b";
    let castling_ok = fields[2] == "-"
        || ((1..=4).contains(&fields[2].len())
            && fields[2].chars().all(|c| "KQkq".contains(c)));
    let ep_ok = fields[3] == "-"
        || (fields[3].len() == 2 && {
            let b = fields[3].as_bytes();
            (b'a'..=b'h').contains(&b[0]) && (b[1] == b'3' || b[1] == b'6')
        });
    let counter_ok = |f: &str| !f.is_empty() && f.len() <= 4 && f.bytes().all(|b| b.is_ascii_digit());

    placement_ok && turn_ok && castling_ok && ep_ok && counter_ok(fields[4]) && counter_ok(fields[5])
}

/// Side to move, from the second FEN field.
pub fn turn_from_fen(fen: &str) -> Result<Color, AppError> {
    match fen.split_whitespace().nth(1) {
        Some("w") => Ok(Color::White),
        Some("b") => Ok(Color::Black),
        _ => Err(AppError::Internal(format!("engine returned malformed FEN: {fen}"))),
    }
}

/// Render the piece-placement field of a FEN as a fixed-width ASCII board.
pub fn render_ascii_board(fen: &str) -> Result<String, AppError> {
    let placement = fen
        .split_whitespace()
        .next()
        .ok_or_else(|| AppError::Internal("empty FEN".to_string()))?;
    let ranks: Vec<&str> = placement.split('/').collect();
    if ranks.len() != 8 {
        return Err(AppError::Internal(format!("malformed FEN placement: {placement}")));
    }

    let mut out = String::new();
    for (i, rank) in ranks.iter().enumerate() {
        let mut cells = Vec::with_capacity(8);
        for c in rank.chars() {
            if let Some(n) = c.to_digit(10) {
                for _ in 0..n {
                    cells.push('.');
                }
            } else {
                cells.push(c);
            }
        }
        if cells.len() != 8 {
            return Err(AppError::Internal(format!("malformed FEN rank: {rank}")));
        }
        out.push_str(&format!("{} ", 8 - i));
        for (j, cell) in cells.iter().enumerate() {
            out.push(*cell);
            if j < 7 {
                out.push(' ');
            }
        }
        out.push('\n');
    }
    out.push_str("  a b c d e f g h\n");
    Ok(out)
}

/// Client IP for rate limiting: first token of `X-Forwarded-For` when
/// present, else the peer address.
pub fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> IpAddr {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or_else(|| peer.ip())
}
