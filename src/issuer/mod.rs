//! Transaction construction, signing, and submission.
//!
//! Each accepted request issues exactly one legacy EIP-155 value transfer:
//! gas price and nonce are fetched live, the payload is RLP-encoded and
//! signed with the faucet's in-memory key, and the raw bytes go to
//! `eth_sendRawTransaction`. Nonce acquisition through submission is
//! serialized with an async mutex; two concurrent issuances signing the same
//! nonce would make one of them silently vanish.

use anyhow::{Context, Result, anyhow};
use k256::ecdsa::{RecoveryId, Signature, SigningKey};
use rlp::RlpStream;
use tokio::sync::Mutex;
use tracing::info;

use crate::address::EthAddress;
use crate::chain::ChainClient;
use crate::error::FaucetError;

/// The faucet's signing key and its derived address.
///
/// Loaded once at startup, held in memory for the process lifetime, never
/// persisted and never logged; only the derived address is printable.
pub struct SigningIdentity {
    key: SigningKey,
    address: EthAddress,
}

impl SigningIdentity {
    pub fn from_hex(private_key_hex: &str) -> Result<Self> {
        let stripped = private_key_hex
            .strip_prefix("0x")
            .unwrap_or(private_key_hex);
        let bytes = hex::decode(stripped).context("Signing key is not valid hex")?;
        let key_bytes: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| anyhow!("Signing key must be exactly 32 bytes"))?;
        let key =
            SigningKey::from_bytes(&key_bytes.into()).context("Signing key is not a valid scalar")?;

        // Ethereum address: last 20 bytes of keccak over the uncompressed
        // public key without its 0x04 tag byte.
        let public = key.verifying_key().to_encoded_point(false);
        let digest = keccak_hash::keccak(&public.as_bytes()[1..]);
        let mut address_bytes = [0u8; 20];
        address_bytes.copy_from_slice(&digest.as_bytes()[12..]);

        Ok(Self {
            key,
            address: EthAddress::from_bytes(address_bytes),
        })
    }

    pub fn address(&self) -> &EthAddress {
        &self.address
    }

    fn sign_digest(&self, digest: &[u8; 32]) -> (Signature, RecoveryId) {
        // Failure here means the in-memory key is corrupted; there is no
        // recovery path for the request.
        self.key
            .sign_prehash_recoverable(digest)
            .expect("ECDSA signing failed: signing key corrupted")
    }
}

struct TransferParams {
    nonce: u64,
    gas_price: u64,
    gas_limit: u64,
    value_wei: u64,
    chain_id: u64,
}

pub struct TransactionIssuer {
    chain: ChainClient,
    identity: SigningIdentity,
    chain_id: u64,
    dispense_amount_wei: u64,
    gas_limit: u64,
    nonce_guard: Mutex<()>,
}

impl TransactionIssuer {
    pub fn new(
        chain: ChainClient,
        identity: SigningIdentity,
        chain_id: u64,
        dispense_amount_wei: u64,
        gas_limit: u64,
    ) -> Self {
        assert!(dispense_amount_wei > 0, "Dispense amount must be positive");
        assert!(gas_limit >= 21_000, "Gas limit below transfer minimum");
        Self {
            chain,
            identity,
            chain_id,
            dispense_amount_wei,
            gas_limit,
            nonce_guard: Mutex::new(()),
        }
    }

    pub fn faucet_address(&self) -> &EthAddress {
        self.identity.address()
    }

    pub fn dispense_amount_wei(&self) -> u64 {
        self.dispense_amount_wei
    }

    pub fn chain(&self) -> &ChainClient {
        &self.chain
    }

    /// Builds, signs, and submits one value transfer to `recipient`.
    ///
    /// Success means the submission endpoint accepted the raw transaction,
    /// not that it is confirmed on-chain.
    pub async fn issue(&self, recipient: &EthAddress) -> Result<String, FaucetError> {
        // Held until the raw transaction is handed to the endpoint; a fresh
        // nonce fetched while another issuance is in flight would collide.
        let _nonce_scope = self.nonce_guard.lock().await;

        let gas_price = self
            .chain
            .gas_price()
            .await
            .map_err(FaucetError::ChainQueryFailed)?;
        let gas_price = u64::try_from(gas_price)
            .map_err(|_| FaucetError::ChainQueryFailed(anyhow!("gas price exceeds u64 range")))?;

        let nonce = self
            .chain
            .transaction_count(self.identity.address())
            .await
            .map_err(FaucetError::ChainQueryFailed)?;

        let params = TransferParams {
            nonce,
            gas_price,
            gas_limit: self.gas_limit,
            value_wei: self.dispense_amount_wei,
            chain_id: self.chain_id,
        };

        let digest = signing_digest(recipient, &params);
        let (signature, recovery_id) = self.identity.sign_digest(&digest);
        let raw = encode_signed(recipient, &params, &signature, recovery_id);

        let tx_hash = self
            .chain
            .send_raw_transaction(&format!("0x{}", hex::encode(&raw)))
            .await
            .map_err(FaucetError::SubmissionFailed)?;

        info!(
            recipient = %recipient,
            nonce,
            gas_price,
            tx_hash = %tx_hash,
            "transaction submitted"
        );
        Ok(tx_hash)
    }
}

/// Keccak digest of the EIP-155 unsigned payload
/// `rlp([nonce, gasPrice, gas, to, value, data, chainId, 0, 0])`.
fn signing_digest(recipient: &EthAddress, params: &TransferParams) -> [u8; 32] {
    let mut stream = RlpStream::new_list(9);
    append_transfer_fields(&mut stream, recipient, params);
    stream.append(&params.chain_id);
    stream.append(&0u8);
    stream.append(&0u8);
    keccak_hash::keccak(stream.out()).0
}

fn encode_signed(
    recipient: &EthAddress,
    params: &TransferParams,
    signature: &Signature,
    recovery_id: RecoveryId,
) -> Vec<u8> {
    let v = params.chain_id * 2 + 35 + u64::from(recovery_id.to_byte());
    let mut stream = RlpStream::new_list(9);
    append_transfer_fields(&mut stream, recipient, params);
    stream.append(&v);
    stream.append(&trim_leading_zeros(&signature.r().to_bytes()));
    stream.append(&trim_leading_zeros(&signature.s().to_bytes()));
    stream.out().to_vec()
}

fn append_transfer_fields(stream: &mut RlpStream, recipient: &EthAddress, params: &TransferParams) {
    stream.append(&params.nonce);
    stream.append(&params.gas_price);
    stream.append(&params.gas_limit);
    stream.append(&recipient.as_bytes().to_vec());
    stream.append(&params.value_wei);
    stream.append(&Vec::<u8>::new());
}

/// RLP requires minimal big-endian integer encoding.
fn trim_leading_zeros(bytes: &[u8]) -> Vec<u8> {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    bytes[start..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Private key 0x..01 has a well-known derived address.
    const KEY_ONE: &str = "0x0000000000000000000000000000000000000000000000000000000000000001";
    const KEY_ONE_ADDRESS: &str = "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf";

    #[test]
    fn identity_derives_known_address() {
        let identity = SigningIdentity::from_hex(KEY_ONE).expect("valid key");
        assert_eq!(identity.address().to_checksummed(), KEY_ONE_ADDRESS);
    }

    #[test]
    fn identity_rejects_malformed_keys() {
        assert!(SigningIdentity::from_hex("0xzz").is_err());
        assert!(SigningIdentity::from_hex("0x0102").is_err());
        // Zero is not a valid secp256k1 scalar.
        assert!(
            SigningIdentity::from_hex(
                "0x0000000000000000000000000000000000000000000000000000000000000000"
            )
            .is_err()
        );
    }

    #[test]
    fn signing_digest_matches_eip155_example() {
        // The worked example from EIP-155: nonce 9, 20 gwei gas price,
        // 21000 gas, 1 ETH to 0x3535..35 on chain id 1.
        let recipient =
            EthAddress::parse("0x3535353535353535353535353535353535353535").expect("address");
        let params = TransferParams {
            nonce: 9,
            gas_price: 20_000_000_000,
            gas_limit: 21_000,
            value_wei: 1_000_000_000_000_000_000,
            chain_id: 1,
        };
        let digest = signing_digest(&recipient, &params);
        assert_eq!(
            hex::encode(digest),
            "daf5a779ae972f972197303d7b574746c7ef83eabadc4b20f9f4e3ff6ab31d7e"
        );
    }

    #[test]
    fn signed_encoding_is_structurally_valid() {
        let identity = SigningIdentity::from_hex(KEY_ONE).expect("valid key");
        let recipient =
            EthAddress::parse("0x3535353535353535353535353535353535353535").expect("address");
        let params = TransferParams {
            nonce: 7,
            gas_price: 1_500_000_000,
            gas_limit: 21_000,
            value_wei: 10_000_000_000_000_000,
            chain_id: 11_155_111,
        };

        let digest = signing_digest(&recipient, &params);
        let (signature, recovery_id) = identity.sign_digest(&digest);
        let raw = encode_signed(&recipient, &params, &signature, recovery_id);

        let decoded = rlp::Rlp::new(&raw);
        assert_eq!(decoded.item_count().expect("list"), 9);
        assert_eq!(decoded.val_at::<u64>(0).expect("nonce"), 7);
        assert_eq!(decoded.val_at::<u64>(1).expect("gas price"), 1_500_000_000);
        assert_eq!(decoded.val_at::<u64>(2).expect("gas limit"), 21_000);
        assert_eq!(
            decoded.val_at::<Vec<u8>>(3).expect("recipient"),
            recipient.as_bytes().to_vec()
        );
        assert_eq!(
            decoded.val_at::<u64>(4).expect("value"),
            10_000_000_000_000_000
        );
        assert!(decoded.val_at::<Vec<u8>>(5).expect("data").is_empty());

        let v = decoded.val_at::<u64>(6).expect("v");
        let base = 11_155_111u64 * 2 + 35;
        assert!(v == base || v == base + 1, "v out of EIP-155 range: {v}");

        // r and s are minimally encoded, so at most 32 bytes and no leading
        // zero byte.
        for index in [7usize, 8usize] {
            let component = decoded.val_at::<Vec<u8>>(index).expect("signature part");
            assert!(component.len() <= 32);
            assert_ne!(component.first(), Some(&0u8));
        }
    }

    #[test]
    fn minimal_integer_trimming() {
        assert_eq!(trim_leading_zeros(&[0, 0, 1, 2]), vec![1, 2]);
        assert_eq!(trim_leading_zeros(&[9, 0, 0]), vec![9, 0, 0]);
        assert!(trim_leading_zeros(&[0, 0, 0]).is_empty());
    }
}
