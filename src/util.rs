/// Appends an invisible suffix to a message, selected by `n`.
///
/// Twitch rejects a message that repeats the previous one in the same
/// channel, so repeated sends of the same text get a different invisible
/// character appended each time. Past 8 repetitions the message is left
/// alone.
pub fn modify_message(message: &mut String, n: usize) {
    const SUFFIX: [char; 8] = [
        '\u{e0000}', '\u{e0002}', '\u{e0003}', '\u{e0004}',
        '\u{e0005}', '\u{e0006}', '\u{e0007}', '\u{e0008}',
    ];

    if n < SUFFIX.len() {
        message.push(SUFFIX[n]);
    }
}
