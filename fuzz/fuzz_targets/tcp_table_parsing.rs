#![no_main]
use connwatch::resolver::{parse_hex_socket_addr, parse_socket_link, parse_tcp_table};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        let _ = parse_tcp_table(input);
        let _ = parse_socket_link(input);

        for token in input.split_whitespace() {
            let _ = parse_hex_socket_addr(token);
        }
    }
});
