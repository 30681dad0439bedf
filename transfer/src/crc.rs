/// CRC-16 as used by XMODEM: CCITT polynomial 0x1021, initial value
/// zero, most significant bit first, no final XOR.
#[must_use]
pub fn crc16_xmodem(data: &[u8]) -> u16 {
    data.iter().fold(0_u16, |crc, &byte| {
        let mut crc = crc ^ (u16::from(byte) << 8);
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
        crc
    })
}
