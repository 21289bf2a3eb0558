//! Buffer de trades da janela atual

use serde_json::Value;

/// Eventos recebidos desde o último flush, na ordem de chegada.
///
/// Guarda os objetos JSON como vieram do feed; o segmento bruto é gravado
/// sem normalização.
pub struct TradeBuffer {
    events: Vec<Value>,
}

impl TradeBuffer {
    /// Pré-aloca espaço para `capacity` eventos.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, event: Value) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Serializa o buffer como array JSON (conteúdo do segmento bruto).
    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        crate::segment::encode_segment(&self.events)
    }

    /// Esvazia o buffer mantendo a capacidade alocada.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Descarta o conteúdo e retorna quantos eventos foram perdidos.
    pub fn discard(&mut self) -> usize {
        let lost = self.events.len();
        self.events.clear();
        lost
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encodes_in_arrival_order() {
        let mut buffer = TradeBuffer::with_capacity(4);
        buffer.push(json!({"p": "1", "t": 1}));
        buffer.push(json!({"p": "2", "t": 2}));

        let decoded = crate::segment::decode_segment(&buffer.encode().unwrap()).unwrap();
        assert_eq!(decoded, vec![json!({"p": "1", "t": 1}), json!({"p": "2", "t": 2})]);
    }

    #[test]
    fn discard_reports_lost_events() {
        let mut buffer = TradeBuffer::with_capacity(4);
        buffer.push(json!({}));
        buffer.push(json!({}));

        assert_eq!(buffer.discard(), 2);
        assert!(buffer.is_empty());
    }
}
