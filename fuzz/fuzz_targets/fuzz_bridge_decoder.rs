#![no_main]
use libfuzzer_sys::fuzz_target;
use turret_bridge::{Bridge, MALFORMED, HANDLED, decode_message};
use turret_traits::CommandSink;

struct Check;

impl CommandSink for Check {
    fn submit(&mut self, command: &[u8]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        // Every forwarded command is one the device decoder accepts.
        assert!(turret_core::parse_command(command).is_ok(), "{command:?}");
        Ok(())
    }
}

fuzz_target!(|data: &[u8]| {
    let rc = Bridge::new(Check).handle(data);
    match decode_message(data) {
        Ok(_) => assert_eq!(rc, HANDLED),
        Err(_) => assert_eq!(rc, MALFORMED),
    }
});
