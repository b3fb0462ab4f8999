// Quick smoke checks runnable without the test harness

use telegraph_core::{
    default_config, CodeBuf, CodeSource, CoreId, Decoder, Encoder, Instant, Message, MessageBus,
    TimerScheduler,
};
use telegraph_core::hal::mock::MockAlarmDriver;
use telegraph_core::pool::CodePool;

fn main() {
    println!("telegraph core smoke checks");

    check_codec_round_trip();
    check_bus_and_scheduler();
    check_pool();

    println!("all smoke checks passed");
    println!();
    println!("run the full suite with: cargo test");
}

fn check_codec_round_trip() {
    println!("codec round trip...");
    let cfg = default_config();
    let mut enc = Encoder::new(cfg);
    let mut dec = Decoder::new(&cfg);
    let mut buf = CodeBuf::new();
    enc.encode_str("HELLO WORLD", &mut buf);
    let mut out = dec.feed(&buf);
    out.push_str(&dec.flush()).ok();
    assert_eq!(out.as_str(), "HELLO WORLD");
    println!("  ok: {:?}", out.as_str());
}

fn check_bus_and_scheduler() {
    println!("bus and scheduler...");
    let bus: MessageBus = MessageBus::new();
    let sched: TimerScheduler = TimerScheduler::new();
    let mut alarm = MockAlarmDriver::new();

    let t0 = Instant::from_millis(0);
    let handle = sched
        .schedule_in(&mut alarm, &bus, CoreId::Core0, Message::DecodeFlush, telegraph_core::Duration::from_millis(100), t0)
        .expect("slot available");
    sched.fire(handle.index(), &bus, Instant::from_millis(100));
    let env = bus.get_nowait(CoreId::Core0).expect("delivered");
    assert_eq!(env.msg, Message::DecodeFlush);
    println!("  ok");
}

fn check_pool() {
    println!("pool...");
    let pool: CodePool = CodePool::new();
    let h = pool.alloc(CodeSource::Key, &[60, -60, 180]).unwrap();
    let (_, seq) = pool.snapshot(h).unwrap();
    assert_eq!(&seq[..], &[60, -60, 180]);
    pool.free(h).unwrap();
    assert_eq!(pool.live(), 0);
    println!("  ok");
}
