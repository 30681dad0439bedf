use std::time::Duration;

use base::prelude::*;

use super::*;
use crate::clock::{Clock, SteppingClock};
use crate::memory::{BackingStore, DEFAULT_RAM_SIZE};

const PARAGRAPH: u16 = 0x0050;
const BLOCK: Address = addr!(0x500);

struct Fields {
    device: &'static [u8; 2],
    index: u16,
    command: &'static [u8; 2],
    buffer: u32,
    target: u32,
    size: u32,
}

impl Fields {
    fn new(device: &'static [u8; 2], command: &'static [u8; 2]) -> Fields {
        Fields {
            device,
            index: 0,
            command,
            buffer: 0,
            target: 0,
            size: 0,
        }
    }
}

fn write_block(ram: &BackingStore, fields: &Fields) -> RequestBlock {
    ram.write_word(BLOCK.wrapping_add(OFFSET_DEVICE), code(fields.device));
    ram.write_word(BLOCK.wrapping_add(OFFSET_INDEX), fields.index);
    ram.write_word(BLOCK.wrapping_add(OFFSET_COMMAND), code(fields.command));
    ram.write_u32(BLOCK.wrapping_add(OFFSET_BUFFER), fields.buffer);
    ram.write_u32(BLOCK.wrapping_add(OFFSET_TARGET), fields.target);
    ram.write_u32(BLOCK.wrapping_add(OFFSET_SIZE), fields.size);
    RequestBlock::read(ram, PARAGRAPH)
}

fn ram() -> BackingStore {
    BackingStore::new(DEFAULT_RAM_SIZE).expect("default size is valid")
}

fn result16(ram: &BackingStore) -> u16 {
    ram.read_word(BLOCK.wrapping_add(OFFSET_BUFFER))
}

#[test]
fn test_codes() {
    assert_eq!(DEV_DISK, 0x4449);
    assert_eq!(code_name(DEV_CONSOLE), "CO");
    assert_eq!(code_name(0x0001), "0x0001");
}

#[test]
fn test_request_block_location() {
    let ram = ram();
    let request = write_block(&ram, &Fields::new(b"IN", b"DI"));
    assert_eq!(RequestBlock::locate(PARAGRAPH), BLOCK);
    assert_eq!(request.origin(), BLOCK);
    assert_eq!(request.device, DEV_INIT);
    assert_eq!(request.command, code(b"DI"));
    assert_eq!(RequestBlock::locate(0xFFFF), addr!(0xFFFF0));
}

#[test]
fn test_init_device() {
    let ram = ram();
    let mut dev = InitDevice::new(DEFAULT_RAM_SIZE);

    let request = write_block(&ram, &Fields::new(b"IN", b"DI"));
    dev.handle(&ram, &request).expect("DI is supported");
    assert_eq!(result16(&ram), 1);

    let request = write_block(&ram, &Fields::new(b"IN", b"RA"));
    dev.handle(&ram, &request).expect("RA is supported");
    assert_eq!(request.buffer(&ram), 0x20000 - 0xF);

    let request = write_block(&ram, &Fields::new(b"IN", b"DO"));
    dev.handle(&ram, &request).expect("DO is supported");
    assert_eq!(result16(&ram), 0x1800);

    let request = write_block(&ram, &Fields::new(b"IN", b"XX"));
    assert!(matches!(
        dev.handle(&ram, &request),
        Err(DeviceError::UnknownCommand(c)) if c == code(b"XX")
    ));

    let mut fields = Fields::new(b"IN", b"DI");
    fields.index = 1;
    let request = write_block(&ram, &fields);
    assert!(matches!(
        dev.handle(&ram, &request),
        Err(DeviceError::BadIndex(1))
    ));
}

fn disk_image() -> Vec<u8> {
    (0..1024_u32).map(|i| (i % 253) as u8).collect()
}

#[test]
fn test_disk_read() {
    let ram = ram();
    let image = disk_image();
    let mut dev = DiskDevice::new(image.clone());
    let mut fields = Fields::new(b"DI", b"RD");
    fields.buffer = 512;
    fields.target = 0x3000;
    fields.size = 16;
    let request = write_block(&ram, &fields);
    dev.handle(&ram, &request).expect("RD is supported");
    assert_eq!(result16(&ram), 1);
    assert_eq!(ram.read_range(addr!(0x3000), 16), &image[512..528]);
}

#[test]
fn test_disk_read_outside_image() {
    let ram = ram();
    let mut dev = DiskDevice::new(disk_image());
    let mut fields = Fields::new(b"DI", b"RD");
    fields.buffer = 1020;
    fields.target = 0x3000;
    fields.size = 16;
    let request = write_block(&ram, &fields);
    dev.handle(&ram, &request).expect("RD is supported");
    assert_eq!(result16(&ram), 0);
    assert!(ram.read_range(addr!(0x3000), 16).iter().all(|&b| b == 0xF4));
}

#[test]
fn test_disk_is_read_only() {
    let ram = ram();
    let mut dev = DiskDevice::new(disk_image());
    let request = write_block(&ram, &Fields::new(b"DI", b"WR"));
    dev.handle(&ram, &request).expect("WR is recognised");
    assert_eq!(result16(&ram), 0);

    let request = write_block(&ram, &Fields::new(b"DI", b"CH"));
    dev.handle(&ram, &request).expect("CH is supported");
    assert_eq!(result16(&ram), 1);

    let mut fields = Fields::new(b"DI", b"RD");
    fields.index = 2;
    fields.buffer = 0xFFFF;
    let request = write_block(&ram, &fields);
    dev.handle(&ram, &request).expect("other drives just fail");
    assert_eq!(result16(&ram), 0);
}

#[test]
fn test_console_output() {
    let ram = ram();
    let console = BufferConsole::new();
    let mut dev = ConsoleDevice::new(console.clone());

    let mut fields = Fields::new(b"CO", b"W1");
    fields.buffer = u32::from(b'>');
    let request = write_block(&ram, &fields);
    dev.handle(&ram, &request).expect("W1 is supported");

    ram.write_range(addr!(0x2000), b"hello");
    let mut fields = Fields::new(b"CO", b"WR");
    fields.target = 0x2000;
    fields.size = 5;
    let request = write_block(&ram, &fields);
    dev.handle(&ram, &request).expect("WR is supported");

    assert_eq!(console.output(), b">hello");
}

#[test]
fn test_console_input_is_held_until_consumed() {
    let ram = ram();
    let console = BufferConsole::new();
    let mut dev = ConsoleDevice::new(console.clone());
    let poll = write_block(&ram, &Fields::new(b"CO", b"RP"));
    dev.handle(&ram, &poll).expect("RP is supported");
    assert_eq!(result16(&ram), 0);

    console.push_input(b"AB");
    dev.handle(&ram, &poll).expect("RP is supported");
    assert_eq!(result16(&ram), 0x141);
    dev.handle(&ram, &poll).expect("RP is supported");
    assert_eq!(result16(&ram), 0x141);

    let take = write_block(&ram, &Fields::new(b"CO", b"R1"));
    dev.handle(&ram, &take).expect("R1 is supported");
    assert_eq!(result16(&ram), 0x141);
    dev.handle(&ram, &take).expect("R1 is supported");
    assert_eq!(result16(&ram), 0x142);
    dev.handle(&ram, &take).expect("R1 is supported");
    assert_eq!(result16(&ram), 0);
}

#[test]
fn test_console_wait_only_after_idle_calls() {
    let ram = ram();
    let console = BufferConsole::new();
    let mut dev = ConsoleDevice::new(console.clone());
    console.push_input(b"Z");
    let wait = write_block(&ram, &Fields::new(b"CO", b"RW"));
    for _ in 0..16 {
        dev.handle(&ram, &wait).expect("RW is supported");
    }
    // Sixteen idle calls have not touched the input.
    let take = write_block(&ram, &Fields::new(b"CO", b"R1"));
    console.push_input(b"Y");
    let wait = write_block(&ram, &Fields::new(b"CO", b"RW"));
    dev.handle(&ram, &wait).expect("RW is supported");
    dev.handle(&ram, &take).expect("R1 is supported");
    assert_eq!(result16(&ram), 0x100 | u16::from(b'Z'));
    dev.handle(&ram, &take).expect("R1 is supported");
    assert_eq!(result16(&ram), 0x100 | u16::from(b'Y'));
}

#[test]
fn test_console_rejects_other_index() {
    let ram = ram();
    let mut dev = ConsoleDevice::new(BufferConsole::new());
    let mut fields = Fields::new(b"CO", b"W1");
    fields.index = 1;
    let request = write_block(&ram, &fields);
    assert!(matches!(
        dev.handle(&ram, &request),
        Err(DeviceError::BadIndex(1))
    ));
}

#[test]
fn test_clock_read() {
    let ram = ram();
    let mut clock = SteppingClock::new(Duration::ZERO);
    clock.consume(&(Duration::from_secs(86_400 + 10) + Duration::from_micros(7)));
    let mut dev = ClockDevice::new(clock);
    let mut fields = Fields::new(b"CL", b"RD");
    fields.target = 0x600;
    fields.size = 12;
    let request = write_block(&ram, &fields);
    dev.handle(&ram, &request).expect("RD is supported");
    assert_eq!(ram.read_u32(addr!(0x600)), 3653);
    assert_eq!(ram.read_u32(addr!(0x604)), 10);
    assert_eq!(ram.read_u32(addr!(0x608)), 7);

    fields.size = 8;
    let request = write_block(&ram, &fields);
    assert!(matches!(
        dev.handle(&ram, &request),
        Err(DeviceError::BadSize(8))
    ));
}

#[test]
fn test_null_devices() {
    let ram = ram();
    let mut dev = NullDevice::new("printer");
    let mut fields = Fields::new(b"PR", b"RP");
    fields.buffer = 0xFFFF;
    let request = write_block(&ram, &fields);
    dev.handle(&ram, &request).expect("RP is supported");
    assert_eq!(result16(&ram), 0);

    let mut fields = Fields::new(b"PR", b"WR");
    fields.buffer = 0x1234;
    let request = write_block(&ram, &fields);
    dev.handle(&ram, &request).expect("other commands are ignored");
    assert_eq!(result16(&ram), 0x1234);
}

#[test]
fn test_mailbox() {
    let mailbox = Mailbox::new();
    assert_eq!(mailbox.status(), 0);
    assert_eq!(mailbox.take(), None);
    mailbox.post(PARAGRAPH);
    assert_eq!(mailbox.status(), 1);
    assert_eq!(mailbox.take(), Some(PARAGRAPH));
    mailbox.complete();
    assert_eq!(mailbox.status(), 0);
    assert!(!mailbox.is_finished());
    mailbox.finish();
    assert!(mailbox.is_finished());
}

fn standard_devices(ram_size: usize, console: BufferConsole) -> DeviceManager {
    let mut devices = DeviceManager::new();
    set_up_devices(
        &mut devices,
        ram_size,
        disk_image(),
        console,
        SteppingClock::default(),
    );
    devices
}

#[test]
fn test_dispatcher_serves_request_posted_before_finish() {
    let ram = ram();
    write_block(&ram, &Fields::new(b"IN", b"DI"));
    let mut dispatcher = Dispatcher::new(
        standard_devices(DEFAULT_RAM_SIZE, BufferConsole::new()),
        ram.shared_handle(),
        0,
    );
    let mailbox = Mailbox::new();
    mailbox.post(PARAGRAPH);
    mailbox.finish();
    assert_eq!(dispatcher.serve(&mailbox), 1);
    assert_eq!(mailbox.status(), 0);
    assert_eq!(result16(&ram), 1);
}

#[test]
fn test_dispatcher_survives_unknown_device() {
    let ram = ram();
    let mut fields = Fields::new(b"ZZ", b"RD");
    fields.buffer = 0x5555;
    write_block(&ram, &fields);
    let mut dispatcher = Dispatcher::new(
        standard_devices(DEFAULT_RAM_SIZE, BufferConsole::new()),
        ram.shared_handle(),
        1,
    );
    dispatcher.handle(PARAGRAPH);
    assert_eq!(dispatcher.requests_served(), 1);
    assert_eq!(result16(&ram), 0x5555);
}
