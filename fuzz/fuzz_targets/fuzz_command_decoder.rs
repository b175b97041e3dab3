#![no_main]
use libfuzzer_sys::fuzz_target;
use turret_core::{ChannelBank, ChannelId, PulseChannel, PulseLimits, parse_command};

fuzz_target!(|data: &[u8]| {
    let Ok(cmd) = parse_command(data) else {
        return;
    };
    // Whatever decodes re-encodes to the same three bytes.
    let body = data
        .strip_suffix(b"\r\n")
        .or_else(|| data.strip_suffix(b"\n"))
        .unwrap_or(data);
    assert_eq!(&cmd.to_bytes()[..], body);

    // Applying it never leaves the channel out of bounds.
    let limits = PulseLimits::default();
    let bank = ChannelBank::new(vec![PulseChannel::new(ChannelId::Pan, limits, limits.center())]);
    if let Some((_, sign)) = cmd.selector.movement() {
        let delta = sign * i64::from(cmd.magnitude) * i64::from(limits.step_us);
        if let Ok(adj) = bank.adjust(ChannelId::Pan, delta) {
            assert!(limits.contains(adj.to_us));
        }
    }
});
