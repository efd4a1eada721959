use dlt645_rs::constants::BROADCAST_ADDRESS;
use dlt645_rs::util::hex::decode_hex;
use dlt645_rs::{DataDomain, DateTime, Dlt645Error, Dlt645Packager, FramePayload, FunctionCode, ReadDataRequest};

const METER: u64 = 304_257_140_001;

const READ_DATA_MARKER_0_HEX: &str = "68010014574230681104333333338F16";
const READ_DATA_BLOCKS_HEX: &str = "680100145742306811053334333336C716";
const READ_FOLLOW_UP_1_HEX: &str = "680100145742306812053334333334C616";
const BROADCAST_READ_ADDRESS_HEX: &str = "689999999999996813007916";
const BROADCAST_TIMING_HEX: &str = "68999999999999680806574564568C8BE116";
const WRITE_ADDRESS_HEX: &str = "68010014574230681506333363758A47D816";
const WRITE_DATA_HEX: &str = "6801001457423068140D373334343545678933333333431A16";

const READ_DATA_RESPONSE_HEX: &str = "6801001457423068910833343333896745337C16";
const READ_ADDRESS_RESPONSE_HEX: &str = "680100145742306893063433478A75635716";
const EXCEPTION_RESPONSE_HEX: &str = "6801001457423068D10135B516";

fn hex_to_bytes(hex: &str) -> Vec<u8> {
    decode_hex(hex).unwrap()
}

#[test]
fn test_read_data_marker_zero() {
    let packager = Dlt645Packager::new(METER);
    let raw = packager
        .encode(&FramePayload::new(
            FunctionCode::ReadData,
            ReadDataRequest::new(0).data_domain(),
        ))
        .unwrap();
    assert_eq!(raw, hex_to_bytes(READ_DATA_MARKER_0_HEX));
}

#[test]
fn test_read_data_with_blocks() {
    let packager = Dlt645Packager::new(METER);
    let raw = packager
        .encode(&FramePayload::new(
            FunctionCode::ReadData,
            ReadDataRequest::new(0x0001_0000).with_blocks(3).data_domain(),
        ))
        .unwrap();
    assert_eq!(raw, hex_to_bytes(READ_DATA_BLOCKS_HEX));
}

#[test]
fn test_read_follow_up_request() {
    let packager = Dlt645Packager::new(METER);
    let data = DataDomain::new().u32(0x0001_0000).u8(1).into_vec();
    let raw = packager
        .encode(&FramePayload::new(FunctionCode::ReadFollowUpData, data))
        .unwrap();
    assert_eq!(raw, hex_to_bytes(READ_FOLLOW_UP_1_HEX));
}

#[test]
fn test_broadcast_read_address() {
    let packager = Dlt645Packager::new(BROADCAST_ADDRESS);
    let raw = packager
        .encode(&FramePayload::new(
            FunctionCode::ReadCommunicationAddress,
            vec![],
        ))
        .unwrap();
    assert_eq!(raw, hex_to_bytes(BROADCAST_READ_ADDRESS_HEX));
}

#[test]
fn test_broadcast_timing() {
    let packager = Dlt645Packager::new(METER);
    let time = DateTime {
        year: 0x24,
        month: 0x12,
        day: 0x31,
        hour: 0x23,
        minute: 0x59,
        second: 0x58,
    };
    let data = DataDomain::new()
        .u8(time.year)
        .u8(time.month)
        .u8(time.day)
        .u8(time.hour)
        .u8(time.minute)
        .u8(time.second)
        .into_vec();
    let raw = packager
        .encode_to(
            BROADCAST_ADDRESS,
            &FramePayload::new(FunctionCode::BroadcastTiming, data),
        )
        .unwrap();
    assert_eq!(raw, hex_to_bytes(BROADCAST_TIMING_HEX));
}

#[test]
fn test_write_communication_address() {
    let packager = Dlt645Packager::new(METER);
    let data = DataDomain::new().u48(0x3042_5714).into_vec();
    let raw = packager
        .encode(&FramePayload::new(FunctionCode::WriteCommunicationAddress, data))
        .unwrap();
    assert_eq!(raw, hex_to_bytes(WRITE_ADDRESS_HEX));
}

#[test]
fn test_write_data() {
    let packager = Dlt645Packager::new(METER);
    let data = DataDomain::new()
        .u32(0x0400_0101)
        .u32(0x0212_3456)
        .u32(0)
        .bytes(&[0x10])
        .into_vec();
    let raw = packager
        .encode(&FramePayload::new(FunctionCode::WriteData, data))
        .unwrap();
    assert_eq!(raw, hex_to_bytes(WRITE_DATA_HEX));
}

#[test]
fn test_read_data_response() {
    let packager = Dlt645Packager::new(METER);
    let raw = hex_to_bytes(READ_DATA_RESPONSE_HEX);
    let request = hex_to_bytes(READ_DATA_BLOCKS_HEX);
    packager.verify(&request, &raw).unwrap();

    let payload = packager.decode(&raw).unwrap();
    assert_eq!(payload.function(), Some(FunctionCode::ReadData));
    assert!(!payload.has_follow_up_data);
    assert_eq!(payload.data, vec![0x00, 0x01, 0x00, 0x00, 0x56, 0x34, 0x12, 0x00]);
}

#[test]
fn test_read_address_response() {
    let packager = Dlt645Packager::new(BROADCAST_ADDRESS);
    let raw = hex_to_bytes(READ_ADDRESS_RESPONSE_HEX);
    packager
        .verify(&hex_to_bytes(BROADCAST_READ_ADDRESS_HEX), &raw)
        .unwrap();

    let payload = packager.decode(&raw).unwrap();
    assert_eq!(
        dlt645_rs::parse_communication_address(&payload.data).unwrap(),
        METER
    );
}

#[test]
fn test_exception_response() {
    let packager = Dlt645Packager::new(METER);
    match packager.decode(&hex_to_bytes(EXCEPTION_RESPONSE_HEX)) {
        Err(Dlt645Error::Exception(e)) => {
            assert_eq!(e.function_code, 0x11);
            assert_eq!(e.exception_code, 0x02);
            assert_eq!(e.kind().name(), "Request without data");
        }
        other => panic!("expected exception, got {other:?}"),
    }
}
