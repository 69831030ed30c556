use connwatch::resolver::{parse_hex_socket_addr, parse_tcp_table};
use criterion::{criterion_group, criterion_main, Criterion};
use std::fmt::Write;
use std::hint::black_box;

fn create_tcp_table(rows: u32) -> String {
    let mut table = String::from(
        "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode\n",
    );
    for i in 0..rows {
        let _ = writeln!(
            table,
            "{i:4}: 0100007F:2329 {:08X}:{:04X} 01 00000000:00000000 00:00000000 00000000   109        0 {} 1 0000000000000000 20 4 30 10 -1",
            0x0a00_0000u32 + i,
            40000 + (i % 20000),
            100_000 + i
        );
    }
    table
}

fn benchmark_parse_tcp_table(c: &mut Criterion) {
    let table = create_tcp_table(1000);
    c.bench_function("parse_tcp_table_1000_rows", |b| {
        b.iter(|| parse_tcp_table(black_box(&table)));
    });
}

fn benchmark_parse_addresses(c: &mut Criterion) {
    c.bench_function("parse_hex_socket_addr_v4", |b| {
        b.iter(|| parse_hex_socket_addr(black_box("0100007F:2329")));
    });

    c.bench_function("parse_hex_socket_addr_v6", |b| {
        b.iter(|| parse_hex_socket_addr(black_box("00000000000000000000000001000000:2329")));
    });
}

criterion_group!(benches, benchmark_parse_tcp_table, benchmark_parse_addresses);
criterion_main!(benches);
