//! The server-side compare-and-swap procedure and the replies it returns.

/// Lua source of the compare-and-swap step.
///
/// `KEYS[1]` is the namespaced bucket key; `ARGV` carries the expected value,
/// the replacement and the expiry in milliseconds. Returns `-1` when the key is
/// absent, `0` when the stored value differs and `1` once swapped.
pub const CAS_SCRIPT: &str = r#"
    local current = redis.call("GET", KEYS[1])
    if current == false then
        return -1
    end

    if current ~= ARGV[1] then
        return 0
    end

    redis.call("SET", KEYS[1], ARGV[2], "PX", ARGV[3])
    return 1
"#;

/// SHA-1 of [`CAS_SCRIPT`], the handle used with `EVALSHA`.
///
/// Any edit to the script must update this value; a test recomputes it.
pub const CAS_SCRIPT_SHA: &str = "34983392a09013297aa6deddcd66649fadb9e7df";

/// Outcome of one [`CAS_SCRIPT`] invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SwapOutcome {
    /// No value is stored under the key.
    Missing,
    /// A value is stored but it is not the expected one.
    Mismatch,
    /// The value was replaced and its expiry reset.
    Swapped,
}

impl TryFrom<i64> for SwapOutcome {
    type Error = i64;

    fn try_from(reply: i64) -> Result<Self, Self::Error> {
        match reply {
            -1 => Ok(Self::Missing),
            0 => Ok(Self::Mismatch),
            1 => Ok(Self::Swapped),
            other => Err(other),
        }
    }
}
